use serde::Serialize;
use std::fmt;

/// Formatted value of a decoded field
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(u64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_owned())
    }
}

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FieldValue {
                fn from(n: $t) -> Self {
                    FieldValue::Number(u64::from(n))
                }
            }
        )*
    };
}

impl_from_number!(u8, u16, u32, u64);

/// One line of a protocol dissection
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecodedField {
    pub name: &'static str,
    pub value: FieldValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DecodedField {
    pub fn new(name: &'static str, value: impl Into<FieldValue>) -> Self {
        DecodedField {
            name,
            value: value.into(),
            description: None,
        }
    }

    pub fn described(
        name: &'static str,
        value: impl Into<FieldValue>,
        description: impl Into<String>,
    ) -> Self {
        DecodedField {
            name,
            value: value.into(),
            description: Some(description.into()),
        }
    }
}

impl fmt::Display for DecodedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(d) => write!(f, "{}: {} ({})", self.name, self.value, d),
            None => write!(f, "{}: {}", self.name, self.value),
        }
    }
}

/// Field reporting that a header does not fit in the remaining bytes
pub(crate) fn incomplete(layer: &'static str, have: usize, need: usize) -> DecodedField {
    DecodedField::described(
        layer,
        "Incomplete header",
        format!("{} bytes available, {} required", have, need),
    )
}

/// `0x`-prefixed lowercase hex, zero-padded to `width` digits
pub(crate) fn hex_value(n: u32, width: usize) -> String {
    format!("0x{:0width$x}", n, width = width)
}
