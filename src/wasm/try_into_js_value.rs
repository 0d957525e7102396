use base64::prelude::*;
use miniscript::bitcoin::psbt::Psbt;
use serde::Serialize;
use wasm_bindgen::JsValue;

use crate::error::WasmOrdinalsError;

pub(crate) trait TryIntoJsValue {
    fn try_to_js_value(&self) -> Result<JsValue, WasmOrdinalsError>;
}

// u64 amounts become plain numbers and maps become objects, matching what
// JSON.parse would hand back for the same data
impl<T: Serialize + ?Sized> TryIntoJsValue for T {
    fn try_to_js_value(&self) -> Result<JsValue, WasmOrdinalsError> {
        self.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|e| WasmOrdinalsError::new(&format!("Failed to convert to JS: {}", e)))
    }
}

macro_rules! js_obj {
    ( $( $key:expr => $value:expr ),* $(,)? ) => {{
        let obj = js_sys::Object::new();
        $(
            js_sys::Reflect::set(&obj, &$key.into(), &$value.try_to_js_value()?)
                .map_err(|_| WasmOrdinalsError::new("Failed to set object property"))?;
        )*
        Ok(Into::<JsValue>::into(obj)) as Result<JsValue, WasmOrdinalsError>
    }};
}

pub(crate) use js_obj;

/// PSBTs cross the boundary as base64, the form wallets accept for signing
pub(crate) fn psbt_to_base64(psbt: &Psbt) -> String {
    BASE64_STANDARD.encode(psbt.serialize())
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn test_u64_becomes_number() {
        let value = 1_234_567u64.try_to_js_value().unwrap();
        assert_eq!(value.as_f64(), Some(1_234_567.0));
    }

    #[wasm_bindgen_test]
    fn test_js_obj_sets_keys() {
        fn build() -> Result<JsValue, WasmOrdinalsError> {
            js_obj!("fee" => 500u64, "address" => "bc1q")
        }
        let obj = build().unwrap();
        let fee = js_sys::Reflect::get(&obj, &"fee".into()).unwrap();
        assert_eq!(fee.as_f64(), Some(500.0));
    }
}
