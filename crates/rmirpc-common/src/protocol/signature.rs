//! Method signatures
//!
//! Every registered method declares the JSON type of each positional
//! parameter. The dispatcher checks incoming argument lists against the
//! declaration before the handler runs, so shape errors surface as
//! `ArgumentMismatch` instead of inside handler code.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{Result, RpcError};
use super::requests::MethodId;

/// Declared type of one positional parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    /// Accepts any value, including `null`
    Any,
    Null,
    Bool,
    /// A number representable as `i64` or `u64`
    Integer,
    /// Any JSON number
    Number,
    String,
    Array,
    Object,
}

impl ArgType {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ArgType::Any => true,
            ArgType::Null => value.is_null(),
            ArgType::Bool => value.is_boolean(),
            ArgType::Integer => value.is_i64() || value.is_u64(),
            ArgType::Number => value.is_number(),
            ArgType::String => value.is_string(),
            ArgType::Array => value.is_array(),
            ArgType::Object => value.is_object(),
        }
    }

    /// Name of the JSON type a value actually has, for error messages.
    pub fn describe(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(n) if n.is_f64() => "number",
            Value::Number(_) => "integer",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

impl std::fmt::Display for ArgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ArgType::Any => "any",
            ArgType::Null => "null",
            ArgType::Bool => "bool",
            ArgType::Integer => "integer",
            ArgType::Number => "number",
            ArgType::String => "string",
            ArgType::Array => "array",
            ArgType::Object => "object",
        };
        f.write_str(name)
    }
}

/// Public shape of one method: its id and declared parameter types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub id: MethodId,
    pub params: Vec<ArgType>,
}

impl MethodDescriptor {
    pub fn new(id: impl Into<MethodId>, params: Vec<ArgType>) -> Self {
        Self {
            id: id.into(),
            params,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Checks arity first, then each position in order.
    pub fn check_args(&self, args: &[Value]) -> Result<()> {
        if args.len() != self.params.len() {
            return Err(RpcError::ArgumentMismatch(format!(
                "{} expects {} argument(s), got {}",
                self.id,
                self.params.len(),
                args.len()
            )));
        }

        for (position, (param, arg)) in self.params.iter().zip(args).enumerate() {
            if !param.accepts(arg) {
                return Err(RpcError::ArgumentMismatch(format!(
                    "{} argument {} expects {}, got {}",
                    self.id,
                    position,
                    param,
                    ArgType::describe(arg)
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_rejects_fractional_numbers() {
        assert!(ArgType::Integer.accepts(&json!(3)));
        assert!(ArgType::Integer.accepts(&json!(u64::MAX)));
        assert!(!ArgType::Integer.accepts(&json!(3.5)));
        assert!(ArgType::Number.accepts(&json!(3.5)));
        assert!(ArgType::Number.accepts(&json!(3)));
    }

    #[test]
    fn test_any_accepts_null() {
        assert!(ArgType::Any.accepts(&Value::Null));
        assert!(!ArgType::String.accepts(&Value::Null));
    }

    #[test]
    fn test_check_args_reports_arity_before_types() {
        let method = MethodDescriptor::new("multiply", vec![ArgType::Number, ArgType::Number]);

        let err = method.check_args(&[json!("x")]).unwrap_err();
        assert_eq!(err.to_string(), "Argument mismatch: multiply expects 2 argument(s), got 1");

        let err = method.check_args(&[json!(3), json!("4")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Argument mismatch: multiply argument 1 expects number, got string"
        );

        assert!(method.check_args(&[json!(3), json!(4.5)]).is_ok());
    }

    #[test]
    fn test_arg_type_wire_names() {
        let encoded = serde_json::to_string(&vec![ArgType::Integer, ArgType::Object]).unwrap();
        assert_eq!(encoded, r#"["integer","object"]"#);
    }
}
