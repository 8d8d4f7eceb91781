/// One mail exchanger for a domain. Lower `preference` wins.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MxRecord {
    pub host: String,
    pub preference: u16,
}

impl MxRecord {
    pub fn new(preference: u16, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            preference,
        }
    }
}
