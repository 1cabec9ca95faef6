//! Service call type

use crate::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A call to a named service, e.g. `baby_care_tracker.start_feeding`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub service_data: serde_json::Value,
    pub context: Context,
}

impl ServiceCall {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// Deserialize the whole payload into a typed struct
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let data = if self.service_data.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            self.service_data.clone()
        };
        serde_json::from_value(data)
    }
}
