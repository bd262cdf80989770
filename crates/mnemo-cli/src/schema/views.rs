use std::path::PathBuf;

use chrono::{DateTime, Utc};
use mnemo_data::view::ViewConfig;
use serde::{Deserialize, Serialize};

/// Index written next to the saved subject views.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ViewManifest {
    pub created_at: DateTime<Utc>,
    pub data_dir: PathBuf,
    pub subjects: Vec<String>,
    pub policies: Vec<String>,
    /// Shared configuration; each policy adds its own theta and phase filters.
    pub config: ViewConfig,
}
