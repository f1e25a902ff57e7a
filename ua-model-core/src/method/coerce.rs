//! Input argument coercion against a method's declared signature.

use super::CallError;
use crate::node::MethodArgument;
use opcua::types::{DataTypeId, Identifier, StatusCode, UAString, Variant};

#[inline]
fn numeric_as_f64(value: &Variant) -> Option<f64> {
    match value {
        Variant::SByte(n) => Some(*n as f64),
        Variant::Byte(n) => Some(*n as f64),
        Variant::Int16(n) => Some(*n as f64),
        Variant::UInt16(n) => Some(*n as f64),
        Variant::Int32(n) => Some(*n as f64),
        Variant::UInt32(n) => Some(*n as f64),
        Variant::Int64(n) => Some(*n as f64),
        Variant::UInt64(n) => Some(*n as f64),
        Variant::Float(f) => Some(*f as f64),
        Variant::Double(f) => Some(*f),
        _ => None,
    }
}

fn as_f64(value: &Variant) -> Result<f64, StatusCode> {
    let n = match value {
        // Numeric fallback for strings.
        Variant::String(s) => s
            .as_ref()
            .trim()
            .parse::<f64>()
            .map_err(|_| StatusCode::BadTypeMismatch)?,
        other => numeric_as_f64(other).ok_or(StatusCode::BadTypeMismatch)?,
    };
    if n.is_finite() {
        Ok(n)
    } else {
        Err(StatusCode::BadOutOfRange)
    }
}

fn as_integer(value: &Variant) -> Result<i128, StatusCode> {
    match value {
        Variant::SByte(n) => Ok(*n as i128),
        Variant::Byte(n) => Ok(*n as i128),
        Variant::Int16(n) => Ok(*n as i128),
        Variant::UInt16(n) => Ok(*n as i128),
        Variant::Int32(n) => Ok(*n as i128),
        Variant::UInt32(n) => Ok(*n as i128),
        Variant::Int64(n) => Ok(*n as i128),
        Variant::UInt64(n) => Ok(*n as i128),
        Variant::Float(_) | Variant::Double(_) | Variant::String(_) => {
            let n = as_f64(value)?;
            if n.fract() != 0.0 {
                return Err(StatusCode::BadTypeMismatch);
            }
            if n.abs() > u64::MAX as f64 {
                return Err(StatusCode::BadOutOfRange);
            }
            Ok(n as i128)
        }
        _ => Err(StatusCode::BadTypeMismatch),
    }
}

fn integer<T: TryFrom<i128>>(value: &Variant, wrap: fn(T) -> Variant) -> Result<Variant, StatusCode> {
    let n = as_integer(value)?;
    T::try_from(n)
        .map(wrap)
        .map_err(|_| StatusCode::BadOutOfRange)
}

/// Coerce one input argument to its declared data type.
///
/// Namespace 0 scalar types are converted where the value fits. Data types
/// of other namespaces are treated as enumerations and take an Int32.
/// Non-scalar arguments must be passed as arrays and are not converted.
pub fn coerce_argument(value: &Variant, argument: &MethodArgument) -> Result<Variant, StatusCode> {
    if matches!(value, Variant::Empty) {
        return Err(StatusCode::BadTypeMismatch);
    }
    if argument.value_rank >= 0 {
        return match value {
            Variant::Array(_) => Ok(value.clone()),
            _ => Err(StatusCode::BadTypeMismatch),
        };
    }
    if matches!(value, Variant::Array(_)) {
        return Err(StatusCode::BadTypeMismatch);
    }

    let data_type = &argument.data_type;
    if data_type.namespace != 0 {
        return integer::<i32>(value, Variant::Int32);
    }
    let Identifier::Numeric(id) = data_type.identifier else {
        return Err(StatusCode::BadTypeMismatch);
    };
    match id {
        x if x == DataTypeId::BaseDataType as u32 => Ok(value.clone()),
        x if x == DataTypeId::Boolean as u32 => match value {
            Variant::Boolean(_) => Ok(value.clone()),
            _ => Err(StatusCode::BadTypeMismatch),
        },
        x if x == DataTypeId::SByte as u32 => integer::<i8>(value, Variant::SByte),
        x if x == DataTypeId::Byte as u32 => integer::<u8>(value, Variant::Byte),
        x if x == DataTypeId::Int16 as u32 => integer::<i16>(value, Variant::Int16),
        x if x == DataTypeId::UInt16 as u32 => integer::<u16>(value, Variant::UInt16),
        x if x == DataTypeId::Int32 as u32 || x == DataTypeId::Enumeration as u32 => {
            integer::<i32>(value, Variant::Int32)
        }
        x if x == DataTypeId::UInt32 as u32 => integer::<u32>(value, Variant::UInt32),
        x if x == DataTypeId::Int64 as u32 => integer::<i64>(value, Variant::Int64),
        x if x == DataTypeId::UInt64 as u32 => integer::<u64>(value, Variant::UInt64),
        x if x == DataTypeId::Double as u32 => as_f64(value).map(Variant::Double),
        x if x == DataTypeId::Float as u32 => {
            let n = as_f64(value)?;
            if n.abs() > f32::MAX as f64 {
                return Err(StatusCode::BadOutOfRange);
            }
            Ok(Variant::Float(n as f32))
        }
        x if x == DataTypeId::String as u32 => match value {
            Variant::String(s) => Ok(Variant::String(UAString::from(s.as_ref()))),
            _ => Err(StatusCode::BadTypeMismatch),
        },
        x if x == DataTypeId::DateTime as u32 => match value {
            Variant::DateTime(_) => Ok(value.clone()),
            _ => Err(StatusCode::BadTypeMismatch),
        },
        x if x == DataTypeId::Guid as u32 => match value {
            Variant::Guid(_) => Ok(value.clone()),
            _ => Err(StatusCode::BadTypeMismatch),
        },
        x if x == DataTypeId::ByteString as u32 => match value {
            Variant::ByteString(_) => Ok(value.clone()),
            _ => Err(StatusCode::BadTypeMismatch),
        },
        _ => Err(StatusCode::BadTypeMismatch),
    }
}

/// Validate the argument count, then coerce every argument.
///
/// All arguments are evaluated so the per-argument results are complete; the
/// overall status is that of the first failing argument.
pub fn coerce_arguments(
    values: &[Variant],
    arguments: &[MethodArgument],
) -> Result<Vec<Variant>, CallError> {
    let (expected, actual) = (arguments.len(), values.len());
    if actual < expected {
        return Err(CallError::ArgumentsMissing { expected, actual });
    }
    if actual > expected {
        return Err(CallError::TooManyArguments { expected, actual });
    }

    let mut coerced = Vec::with_capacity(actual);
    let mut results = Vec::with_capacity(actual);
    let mut first_failure = None;
    for (value, argument) in values.iter().zip(arguments) {
        match coerce_argument(value, argument) {
            Ok(value) => {
                coerced.push(value);
                results.push(StatusCode::Good);
            }
            Err(status) => {
                first_failure.get_or_insert(status);
                results.push(status);
            }
        }
    }
    match first_failure {
        Some(status) => Err(CallError::ArgumentCoercionFailed {
            status,
            input_argument_results: results,
        }),
        None => Ok(coerced),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcua::types::NodeId;

    fn set_point() -> Vec<MethodArgument> {
        vec![MethodArgument::scalar(
            "SetPoint",
            DataTypeId::Double,
            "Temperature Setpoint [°C]",
        )]
    }

    #[test]
    fn test_argument_count() {
        let args = set_point();
        assert_eq!(
            coerce_arguments(&[], &args),
            Err(CallError::ArgumentsMissing {
                expected: 1,
                actual: 0
            })
        );
        let err = coerce_arguments(&[Variant::Double(1.0), Variant::Double(2.0)], &args)
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BadTooManyArguments);
        assert!(err.input_argument_results().is_empty());
    }

    #[test]
    fn test_double_coercion() {
        let args = set_point();
        assert_eq!(
            coerce_arguments(&[Variant::Int32(42)], &args).unwrap(),
            vec![Variant::Double(42.0)]
        );
        assert_eq!(
            coerce_arguments(&[Variant::String(UAString::from(" 21.5 "))], &args).unwrap(),
            vec![Variant::Double(21.5)]
        );

        let err = coerce_arguments(&[Variant::Boolean(true)], &args).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BadTypeMismatch);
        assert_eq!(err.input_argument_results(), &[StatusCode::BadTypeMismatch]);

        let err = coerce_arguments(&[Variant::Double(f64::NAN)], &args).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BadOutOfRange);
    }

    #[test]
    fn test_every_argument_is_reported() {
        let args = vec![
            MethodArgument::scalar("A", DataTypeId::Int16, ""),
            MethodArgument::scalar("B", DataTypeId::Boolean, ""),
            MethodArgument::scalar("C", DataTypeId::Byte, ""),
        ];
        let err = coerce_arguments(
            &[Variant::Int32(40_000), Variant::Boolean(false), Variant::Double(1.5)],
            &args,
        )
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BadOutOfRange);
        assert_eq!(
            err.input_argument_results(),
            &[StatusCode::BadOutOfRange, StatusCode::Good, StatusCode::BadTypeMismatch]
        );
    }

    #[test]
    fn test_enumeration_and_arrays() {
        let status = MethodArgument::scalar("Status", NodeId::new(2, 3001u32), "");
        assert_eq!(
            coerce_argument(&Variant::UInt16(2), &status),
            Ok(Variant::Int32(2))
        );
        assert_eq!(
            coerce_argument(&Variant::Empty, &status),
            Err(StatusCode::BadTypeMismatch)
        );

        let mut values = MethodArgument::scalar("Values", DataTypeId::Double, "");
        values.value_rank = 1;
        assert_eq!(
            coerce_argument(&Variant::Double(1.0), &values),
            Err(StatusCode::BadTypeMismatch)
        );
    }
}
