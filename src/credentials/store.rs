//! INI credential file keyed by subscription id.
//!
//! ```ini
//! [6e4c1c8a-0000-0000-0000-000000000000]
//! tenant_id = ...
//! client_id = ...
//! client_secret = ...
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use config::{Config, File, FileFormat, Value};
use tracing::{debug, warn};

type Section = HashMap<String, String>;

/// Read-only view of the credential file. The file is read on the first lookup and the
/// result is kept for the lifetime of the store.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    sections: OnceLock<HashMap<String, Section>>,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            sections: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value of `property` inside the section named after `subscription_id`.
    ///
    /// Subscription ids are GUIDs, so section names are compared ignoring ASCII case.
    pub fn property(&self, subscription_id: &str, property: &str) -> Option<String> {
        self.sections()
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(subscription_id))
            .and_then(|(_, section)| section.get(property))
            .filter(|value| !value.is_empty())
            .cloned()
    }

    fn sections(&self) -> &HashMap<String, Section> {
        self.sections.get_or_init(|| match load(&self.path) {
            Ok(sections) => {
                debug!(
                    "loaded {} credential sections from {}",
                    sections.len(),
                    self.path.display()
                );
                sections
            }
            Err(reason) => {
                warn!(
                    "{} was not found or not accessible ({reason}). Will use environment variables or MSI.",
                    self.path.display()
                );
                HashMap::new()
            }
        })
    }
}

fn load(path: &Path) -> Result<HashMap<String, Section>, String> {
    if !path.is_file() {
        return Err("not a file".to_string());
    }

    let root: HashMap<String, Value> = Config::builder()
        .add_source(File::from(path).format(FileFormat::Ini))
        .build()
        .and_then(|config| config.try_deserialize())
        .map_err(|e| e.to_string())?;

    let sections = root
        .into_iter()
        .filter_map(|(name, value)| {
            // Keys outside of any section are not credentials.
            let table = value.into_table().ok()?;
            let section = table
                .into_iter()
                .filter_map(|(key, value)| Some((key, value.into_string().ok()?)))
                .collect();
            Some((name, section))
        })
        .collect();

    Ok(sections)
}
