//! Validación de argumentos del `Journal`.
//!
//! Dos entradas:
//! - Argumentos tipados (`validate_append`, `validate_range`): Rust ya
//!   descarta tipos inválidos, sólo quedan las reglas de contenido.
//! - Peticiones laxas (`AppendRequest`, `ListRequest`) deserializadas desde
//!   JSON (CLI u otra superficie externa), donde cada campo puede llegar con
//!   cualquier tipo. El orden de verificación es fijo: gana el primer fallo.
//!
//! Ninguna validación realiza I/O de backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::model::{NewEvent, Version, VersionRange};

/// Marca con la que un payload serializado declara ser invocable.
pub const FUNCTION_TAG: &str = "$function";
/// Marcas con las que un payload serializado declara ser instancia de un tipo
/// propio en lugar de una estructura asociativa plana.
pub const TYPE_TAGS: [&str; 2] = ["$class", "$type"];

pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::MissingEventName);
    }
    Ok(())
}

pub fn validate_ref(reference: &str) -> Result<(), ValidationError> {
    if reference.trim().is_empty() {
        return Err(ValidationError::MissingRef);
    }
    Ok(())
}

/// Sólo los objetos del nivel superior pueden declararse invocables o
/// instancias de tipo; arrays y escalares siempre se aceptan.
pub fn validate_payload(payload: &Value) -> Result<(), ValidationError> {
    if let Value::Object(map) = payload {
        check_object(map)?;
    }
    Ok(())
}

fn check_object(map: &Map<String, Value>) -> Result<(), ValidationError> {
    if map.contains_key(FUNCTION_TAG) {
        return Err(ValidationError::PayloadIsFunction);
    }
    if TYPE_TAGS.iter().any(|t| map.contains_key(*t)) {
        return Err(ValidationError::PayloadIsCustomObject);
    }
    Ok(())
}

pub fn validate_range(range: VersionRange) -> Result<VersionRange, ValidationError> {
    if let (Some(from), Some(to)) = (range.from, range.to) {
        if from > to {
            return Err(ValidationError::RangeInverted { from, to });
        }
    }
    Ok(range)
}

/// Validación de argumentos tipados de append.
pub fn validate_append(new_event: &NewEvent) -> Result<(), ValidationError> {
    validate_name(&new_event.name)?;
    if let Some(payload) = &new_event.payload {
        validate_payload(payload)?;
    }
    validate_ref(&new_event.reference)
}

/// Interpreta un valor laxo como versión: número entero no negativo.
fn version_from(value: &Value) -> Result<Version, ValidationError> {
    let n = match value {
        Value::Number(n) => n,
        _ => return Err(ValidationError::InvalidVersionType),
    };
    if let Some(v) = n.as_u64() {
        return Ok(v);
    }
    if n.as_i64().is_some_and(|v| v < 0) {
        return Err(ValidationError::NegativeVersion);
    }
    match n.as_f64() {
        Some(f) if f < 0.0 => Err(ValidationError::NegativeVersion),
        Some(f) if f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as Version),
        _ => Err(ValidationError::NonIntegerVersion),
    }
}

fn optional_version(value: Option<&Value>) -> Result<Option<Version>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => version_from(v).map(Some),
    }
}

/// Petición de append con tipos sin verificar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppendRequest {
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default, rename = "ref")]
    pub reference: Option<Value>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub initiated_by: Option<Value>,
    #[serde(default)]
    pub expected_version: Option<Value>,
}

impl AppendRequest {
    /// Orden: nombre, versión esperada, payload, ref, iniciador.
    pub fn validate(self) -> Result<NewEvent, ValidationError> {
        let name = match self.name {
            None | Some(Value::Null) => return Err(ValidationError::MissingEventName),
            Some(Value::String(s)) => s,
            Some(_) => return Err(ValidationError::InvalidEventName),
        };
        validate_name(&name)?;
        let expected_version = optional_version(self.expected_version.as_ref())?;
        let payload = match self.payload {
            None | Some(Value::Null) => None,
            Some(p) => {
                validate_payload(&p)?;
                Some(p)
            }
        };
        let reference = match self.reference {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(ValidationError::MissingRef),
        };
        validate_ref(&reference)?;
        let initiated_by = match self.initiated_by {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Ok(NewEvent { name, reference, payload, initiated_by, expected_version })
    }
}

/// Petición de lectura con tipos sin verificar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListRequest {
    #[serde(default, rename = "ref")]
    pub reference: Option<Value>,
    #[serde(default)]
    pub from_version: Option<Value>,
    #[serde(default)]
    pub to_version: Option<Value>,
}

impl ListRequest {
    pub fn validate(self) -> Result<(String, VersionRange), ValidationError> {
        let from = optional_version(self.from_version.as_ref())?;
        let to = optional_version(self.to_version.as_ref())?;
        let range = validate_range(VersionRange::new(from, to))?;
        let reference = match self.reference {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(ValidationError::MissingRef),
        };
        validate_ref(&reference)?;
        Ok((reference, range))
    }
}
