//! Title metadata registry loaded from `games.json`
//!
//! Maps a game's display name to the title-storage descriptor needed to
//! fetch its saves, and compiles every lookup expression once at load.

use crate::error::{Error, Result, SelectionError};
use crate::selection::{DEFAULT_LOOKUP_FILTER, LookupExpression, TitleSelector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// How binary blobs are named locally
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveLayout {
    /// The key of each lookup match becomes the local file name
    #[default]
    ByLookupKey,
    /// The metadata blob's own normalized path becomes the local file name
    ByRemoteName,
}

impl FromStr for SaveLayout {
    type Err = SelectionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "by_lookup_key" | "ByLookupKey" | "atom_filename" => Ok(SaveLayout::ByLookupKey),
            "by_remote_name" | "ByRemoteName" | "blob_filename" => Ok(SaveLayout::ByRemoteName),
            other => Err(SelectionError::UnknownSaveLayout {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SaveLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveLayout::ByLookupKey => write!(f, "by_lookup_key"),
            SaveLayout::ByRemoteName => write!(f, "by_remote_name"),
        }
    }
}

/// One entry of `games.json` as written on disk
#[derive(Debug, Deserialize)]
struct RawDescriptor {
    title_id: u64,
    #[serde(alias = "scid")]
    service_config_id: String,
    #[serde(alias = "pfn")]
    package_family_name: String,
    #[serde(alias = "jsonpath_filter", default)]
    lookup_filter: Option<String>,
    #[serde(alias = "save_method", default)]
    save_layout: Option<String>,
}

/// Storage descriptor of one game
#[derive(Clone, Debug, Serialize)]
pub struct TitleDescriptor {
    /// Display name (the key in `games.json`)
    pub name: String,
    /// Numeric title id
    pub title_id: u64,
    /// Service config id (scid)
    pub service_config_id: String,
    /// Package family name (pfn)
    pub package_family_name: String,
    /// Lookup expression selecting the binary blobs
    pub lookup_filter: String,
    /// Local naming strategy for binaries
    pub save_layout: SaveLayout,
}

/// Registry of known titles, in file order
#[derive(Debug)]
pub struct TitleRegistry {
    titles: Vec<TitleDescriptor>,
    selectors: Vec<TitleSelector>,
    by_name: HashMap<String, usize>,
    by_package: HashMap<String, usize>,
    fallback: TitleSelector,
}

impl TitleRegistry {
    /// A registry without titles; every package gets the fallback selector
    pub fn empty() -> Result<Self> {
        Ok(Self {
            titles: Vec::new(),
            selectors: Vec::new(),
            by_name: HashMap::new(),
            by_package: HashMap::new(),
            fallback: TitleSelector::fallback()?,
        })
    }

    /// Load the registry from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read_to_string(path).await?;
        let registry = Self::from_json_str(&data)?;
        info!(?path, titles = registry.len(), "loaded title registry");
        Ok(registry)
    }

    /// Parse a registry document
    ///
    /// Fails on unknown save layouts and on lookup expressions that do not
    /// compile; both are configuration defects.
    pub fn from_json_str(data: &str) -> Result<Self> {
        let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(data)?;
        let mut registry = Self::empty()?;

        for (name, value) in raw {
            let entry: RawDescriptor = serde_json::from_value(value).map_err(|e| Error::Config {
                message: format!("invalid entry for {}: {}", name, e),
                key: Some(name.clone()),
            })?;

            let save_layout = match entry.save_layout.as_deref() {
                Some(value) => value.parse::<SaveLayout>()?,
                None => SaveLayout::default(),
            };
            let lookup_filter = entry
                .lookup_filter
                .unwrap_or_else(|| DEFAULT_LOOKUP_FILTER.to_string());

            debug!(title = %name, pfn = %entry.package_family_name, "compiling lookup filter");
            let expression = LookupExpression::parse(&lookup_filter)?;

            registry.insert(
                TitleDescriptor {
                    name,
                    title_id: entry.title_id,
                    service_config_id: entry.service_config_id,
                    package_family_name: entry.package_family_name,
                    lookup_filter,
                    save_layout,
                },
                TitleSelector::new(expression, save_layout),
            )?;
        }

        Ok(registry)
    }

    fn insert(&mut self, title: TitleDescriptor, selector: TitleSelector) -> Result<()> {
        if self.by_package.contains_key(&title.package_family_name) {
            return Err(Error::Config {
                message: format!(
                    "package family name {} is registered twice",
                    title.package_family_name
                ),
                key: Some(title.name),
            });
        }

        let index = self.titles.len();
        self.by_name.insert(title.name.clone(), index);
        self.by_package
            .insert(title.package_family_name.clone(), index);
        self.titles.push(title);
        self.selectors.push(selector);
        Ok(())
    }

    /// Descriptor by display name
    pub fn get(&self, name: &str) -> Option<&TitleDescriptor> {
        self.by_name.get(name).map(|&i| &self.titles[i])
    }

    /// Descriptor by package family name
    pub fn by_package(&self, pfn: &str) -> Option<&TitleDescriptor> {
        self.by_package.get(pfn).map(|&i| &self.titles[i])
    }

    /// Selector for a package, falling back to the default for unregistered titles
    pub fn selector_for(&self, pfn: &str) -> TitleSelector {
        match self.by_package.get(pfn) {
            Some(&i) => self.selectors[i].clone(),
            None => {
                warn!(%pfn, "title not configured in registry, using default lookup");
                self.fallback.clone()
            }
        }
    }

    /// Titles in file order
    pub fn iter(&self) -> impl Iterator<Item = &TitleDescriptor> {
        self.titles.iter()
    }

    /// Number of titles
    pub fn len(&self) -> usize {
        self.titles.len()
    }

    /// Whether no titles are registered
    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}
