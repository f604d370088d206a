//! Module Catalog Loading
//!
//! Reads the prompt module catalog once and serves lookups from memory.
//! The catalog source is a YAML mapping of category name to a list of
//! modules; categories are flattened in file order.
//!
//! Loading is lenient: an unreadable or malformed source yields an empty
//! catalog and an error-level diagnostic instead of failing the process.
//! Workflows that reference modules then fail at lookup time.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info};
use once_cell::sync::OnceCell;

use super::model::Module;
use crate::error::{Error, Result};

/// Modules grouped by category, in source order.
pub type CatalogData = Vec<(String, Vec<Module>)>;

/// Something that can produce the raw module catalog.
pub trait ModuleSource: Send + Sync {
    /// Reads and parses the whole catalog.
    fn read_catalog(&self) -> Result<CatalogData>;

    /// Short description used in diagnostics.
    fn describe(&self) -> String;
}

/// Catalog stored as a YAML file on disk.
#[derive(Debug, Clone)]
pub struct YamlFileSource {
    path: PathBuf,
}

impl YamlFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModuleSource for YamlFileSource {
    fn read_catalog(&self) -> Result<CatalogData> {
        let path = self.path.display().to_string();

        let content = fs::read_to_string(&self.path).map_err(|e| Error::Configuration {
            path: path.clone(),
            reason: format!("failed to read catalog file: {}", e),
        })?;

        debug!("Catalog content loaded ({} bytes)", content.len());
        parse_catalog(&content).map_err(|reason| Error::Configuration { path, reason })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Fixed, in-memory catalog. Used for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    modules: Vec<Module>,
}

impl StaticSource {
    pub fn new(modules: Vec<Module>) -> Self {
        Self { modules }
    }
}

impl ModuleSource for StaticSource {
    fn read_catalog(&self) -> Result<CatalogData> {
        Ok(vec![("static".to_string(), self.modules.clone())])
    }

    fn describe(&self) -> String {
        "static catalog".to_string()
    }
}

/// Parses catalog YAML into categories of modules.
pub fn parse_catalog(content: &str) -> std::result::Result<CatalogData, String> {
    let mapping: serde_yaml::Mapping = serde_yaml::from_str(content)
        .map_err(|e| format!("failed to parse catalog YAML: {}", e))?;

    let mut categories = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let category = key
            .as_str()
            .ok_or_else(|| "catalog category names must be strings".to_string())?
            .to_string();

        // A category with no entries is written as `name:` and parses as null
        let modules: Vec<Module> = if value.is_null() {
            Vec::new()
        } else {
            serde_yaml::from_value(value)
                .map_err(|e| format!("invalid module in category '{}': {}", category, e))?
        };

        categories.push((category, modules));
    }

    Ok(categories)
}

/// Read-only module lookup, loaded once.
///
/// Construct it at startup with [`ModuleCatalog::new`], call
/// [`load_all`](ModuleCatalog::load_all) once, and share it behind an `Arc`.
/// After loading the catalog is never mutated, so concurrent readers need no
/// locking.
pub struct ModuleCatalog {
    source: Box<dyn ModuleSource>,
    modules: OnceCell<Vec<Module>>,
}

impl ModuleCatalog {
    /// Creates a catalog backed by a source. Nothing is read until
    /// [`load_all`](Self::load_all) is called.
    pub fn new(source: impl ModuleSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            modules: OnceCell::new(),
        }
    }

    /// Creates a catalog over a fixed list of modules.
    pub fn from_modules(modules: Vec<Module>) -> Self {
        Self::new(StaticSource::new(modules))
    }

    /// Returns all modules, reading the source on the first call only.
    ///
    /// Never fails: a source error is logged and results in an empty catalog.
    pub fn load_all(&self) -> &[Module] {
        self.modules.get_or_init(|| match self.source.read_catalog() {
            Ok(categories) => {
                let category_count = categories.len();
                let modules: Vec<Module> = categories
                    .into_iter()
                    .flat_map(|(_, modules)| modules)
                    .collect();

                info!(
                    "Loaded {} modules in {} categories from {}",
                    modules.len(),
                    category_count,
                    self.source.describe()
                );
                modules
            }
            Err(e) => {
                error!("{}", e);
                error!("Continuing with an empty module catalog");
                Vec::new()
            }
        })
    }

    /// Looks up a module by id.
    pub fn find_by_id(&self, id: &str) -> Option<&Module> {
        self.load_all().iter().find(|module| module.id == id)
    }

    /// Returns the number of loaded modules.
    pub fn len(&self) -> usize {
        self.load_all().len()
    }

    /// Returns true if no modules are loaded.
    pub fn is_empty(&self) -> bool {
        self.load_all().is_empty()
    }
}

impl std::fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCatalog")
            .field("source", &self.source.describe())
            .field("loaded", &self.modules.get().map(Vec::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    const CATALOG_YAML: &str = r#"
core:
  - id: input__core_extract__v1
    name: Core extraction
    prompt_template: "Extract: {{input}}"
  - id: logic__directive_translate__v1
    name: Directive translation
    prompt_template: "Translate: {{input}}"
builder_extensions:
  - id: example_generator__positive_negative__v1
    name: Examples
    prompt_template: "Examples: {{input}}"
    execution_mode: gemini_generation
empty_category:
"#;

    struct CountingSource {
        reads: Arc<AtomicUsize>,
    }

    impl ModuleSource for CountingSource {
        fn read_catalog(&self) -> Result<CatalogData> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(vec![(
                "core".to_string(),
                vec![Module::new("m1", "M1", "{{input}}")],
            )])
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    #[test]
    fn test_parse_catalog_flattens_in_order() {
        let categories = parse_catalog(CATALOG_YAML).unwrap();
        assert_eq!(categories.len(), 3);
        assert_eq!(categories[0].0, "core");
        assert_eq!(categories[0].1.len(), 2);
        assert!(categories[2].1.is_empty());
    }

    #[test]
    fn test_load_from_yaml_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("prompt-modules.yaml");
        std::fs::write(&path, CATALOG_YAML).unwrap();

        let catalog = ModuleCatalog::new(YamlFileSource::new(&path));
        let ids: Vec<&str> = catalog.load_all().iter().map(|m| m.id.as_str()).collect();

        assert_eq!(
            ids,
            vec![
                "input__core_extract__v1",
                "logic__directive_translate__v1",
                "example_generator__positive_negative__v1"
            ]
        );
        assert!(catalog.find_by_id("logic__directive_translate__v1").is_some());
        assert!(catalog.find_by_id("logic__unknown__v1").is_none());
    }

    #[test]
    fn test_missing_file_yields_empty_catalog() {
        let catalog = ModuleCatalog::new(YamlFileSource::new("/nonexistent/prompt-modules.yaml"));
        assert!(catalog.is_empty());
        assert!(catalog.find_by_id("input__core_extract__v1").is_none());
    }

    #[test]
    fn test_malformed_file_yields_empty_catalog() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("bad.yaml");
        std::fs::write(&path, "this is not valid yaml: [[[").unwrap();

        let catalog = ModuleCatalog::new(YamlFileSource::new(&path));
        assert_eq!(catalog.len(), 0);
    }

    #[test]
    fn test_source_error_is_configuration_error() {
        let source = YamlFileSource::new("/nonexistent/prompt-modules.yaml");
        let err = source.read_catalog().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_load_all_reads_source_once() {
        let reads = Arc::new(AtomicUsize::new(0));
        let catalog = ModuleCatalog::new(CountingSource {
            reads: Arc::clone(&reads),
        });

        assert_eq!(catalog.load_all().len(), 1);
        assert_eq!(catalog.load_all().len(), 1);
        assert!(catalog.find_by_id("m1").is_some());
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_module_without_id_is_rejected() {
        let result = parse_catalog("core:\n  - name: no id\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("core"));
    }
}
