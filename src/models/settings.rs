use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::events::Loggable;

/// A canonical setting key and the value new accounts start with.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct SettingDefinition {
    pub setting_key: String,
    pub default_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserSetting {
    pub user_id: i64,
    #[schema(example = "theme")]
    pub setting_key: String,
    #[schema(example = "dark")]
    pub setting_value: String,
}

impl Loggable for UserSetting {
    fn entity_type() -> &'static str { "user_setting" }
    fn subject_id(&self) -> i64 { self.user_id }
}

/// Body of a settings update: setting key to new value. Non-string scalars
/// are accepted and stored in their JSON text form.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[schema(value_type = Object, example = json!({"theme": "dark", "language": "fr"}))]
pub struct SettingsUpdateRequest(pub BTreeMap<String, Value>);

impl SettingsUpdateRequest {
    pub fn into_updates(self) -> BTreeMap<String, String> {
        self.0
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect()
    }
}
