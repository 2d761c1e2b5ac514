//! Transaction-code to parser registry with plugin discovery.
//!
//! Parsers are trusted code living in this process. A plugin artifact is a
//! declarative JSON manifest naming the parser factory to bind; the factory
//! itself comes from a [FactoryCatalog] the host extends with its own
//! implementations. Directory discovery is a pure function from a path to a
//! list of descriptors and never mutates a live registry.

use crate::diagnostic::{codes, Diagnostic};
use crate::parsers::{
    Parser270, Parser276, Parser835, Parser837P, ParsedPayload, TransactionParser,
};
use crate::segment::{Delimiters, RawSegment};
use crate::transaction::Payload;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Shared handle to a transaction parser.
pub type ParserFactory = Arc<dyn TransactionParser>;

/// Everything the registry needs to know about one plugin.
#[derive(Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    pub transaction_codes: Vec<String>,
    /// Tag stamped on payloads this plugin produces. Must be distinct
    /// across the registry.
    pub payload_type_tag: String,
    pub parser_factory: ParserFactory,
    pub schema_reference: Option<String>,
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("transaction_codes", &self.transaction_codes)
            .field("payload_type_tag", &self.payload_type_tag)
            .finish()
    }
}

#[derive(Clone)]
struct Registration {
    plugin_name: String,
    payload_type_tag: String,
    parser: ParserFactory,
}

/// Maps transaction set codes to parsers. At most one parser per code; the
/// most recent registration wins and overriding a different plugin's code
/// is reported as a warning.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, Registration>,
}

impl ParserRegistry {
    pub fn new() -> ParserRegistry {
        ParserRegistry::default()
    }

    /// A registry with the built-in healthcare parsers registered.
    pub fn with_builtins() -> ParserRegistry {
        let mut registry = ParserRegistry::new();
        for descriptor in builtin_descriptors() {
            registry.register(descriptor);
        }
        registry
    }

    /// Insert a parser for each supported code. Re-registering the same
    /// `(name, code)` pair is idempotent; claiming a code held by a
    /// different plugin overwrites it and emits a `PLUGIN_OVERRIDE`
    /// warning.
    pub fn register(&mut self, descriptor: PluginDescriptor) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for code in &descriptor.transaction_codes {
            if let Some(existing) = self.parsers.get(code) {
                if existing.plugin_name == descriptor.name {
                    continue;
                }
                tracing::warn!(
                    code = %code,
                    previous = %existing.plugin_name,
                    replacement = %descriptor.name,
                    "parser registration overridden"
                );
                diagnostics.push(
                    Diagnostic::warning(
                        codes::PLUGIN_OVERRIDE,
                        format!(
                            "parser for transaction code {} replaced: {} -> {}",
                            code, existing.plugin_name, descriptor.name
                        ),
                    )
                    .with_value(code.clone()),
                );
            }
            self.parsers.insert(
                code.clone(),
                Registration {
                    plugin_name: descriptor.name.clone(),
                    payload_type_tag: descriptor.payload_type_tag.clone(),
                    parser: descriptor.parser_factory.clone(),
                },
            );
        }
        diagnostics
    }

    /// The parser registered for a transaction set code, if any.
    pub fn lookup(&self, set_code: &str) -> Option<ParserFactory> {
        self.parsers.get(set_code).map(|r| r.parser.clone())
    }

    /// The registered `(code, plugin name)` pairs, sorted by code.
    pub fn registered_codes(&self) -> Vec<(String, String)> {
        let mut codes: Vec<(String, String)> = self
            .parsers
            .iter()
            .map(|(code, registration)| (code.clone(), registration.plugin_name.clone()))
            .collect();
        codes.sort();
        codes
    }

    fn payload_tag_in_use(&self, tag: &str) -> bool {
        self.parsers.values().any(|r| r.payload_type_tag == tag)
    }
}

/// Named parser factories a manifest can bind to. Hosts register their own
/// implementations next to the built-in kinds and the generic `untyped`
/// pass-through.
#[derive(Clone, Default)]
pub struct FactoryCatalog {
    factories: HashMap<String, ParserFactory>,
}

impl FactoryCatalog {
    pub fn new() -> FactoryCatalog {
        FactoryCatalog::default()
    }

    /// The catalog of built-in parser kinds.
    pub fn with_builtins() -> FactoryCatalog {
        let mut catalog = FactoryCatalog::new();
        catalog.insert("835", Arc::new(Parser835));
        catalog.insert("837p", Arc::new(Parser837P));
        catalog.insert("270", Arc::new(Parser270));
        catalog.insert("276", Arc::new(Parser276));
        catalog.insert("untyped", Arc::new(UntypedParser));
        catalog
    }

    pub fn insert(&mut self, kind: &str, factory: ParserFactory) {
        self.factories.insert(kind.to_string(), factory);
    }

    pub fn get(&self, kind: &str) -> Option<ParserFactory> {
        self.factories.get(kind).cloned()
    }
}

/// Fallback parser bound by manifests that bring no code of their own: the
/// frame passes through as untyped segments under the plugin's type tag.
struct UntypedParser;

impl TransactionParser for UntypedParser {
    fn supported_codes(&self) -> &[&'static str] {
        &[]
    }

    fn validate_envelope(&self, segments: &[RawSegment]) -> bool {
        segments.first().map(|s| s.is("ST")).unwrap_or(false)
    }

    fn parse(
        &self,
        segments: &[RawSegment],
        _delimiters: Delimiters,
        _handler: &mut crate::handler::ErrorHandler,
    ) -> Result<ParsedPayload, crate::handler::ParseError> {
        Ok(ParsedPayload {
            payload: Payload::Untyped,
            extra_segments: segments
                .iter()
                .filter(|s| !s.is("ST") && !s.is("SE"))
                .cloned()
                .collect(),
        })
    }
}

fn builtin_descriptors() -> Vec<PluginDescriptor> {
    vec![
        PluginDescriptor {
            name: "builtin-835".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            transaction_codes: vec!["835".to_string()],
            payload_type_tag: "835".to_string(),
            parser_factory: Arc::new(Parser835),
            schema_reference: None,
        },
        PluginDescriptor {
            name: "builtin-837p".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            transaction_codes: vec!["837".to_string()],
            payload_type_tag: "837P".to_string(),
            parser_factory: Arc::new(Parser837P),
            schema_reference: None,
        },
        PluginDescriptor {
            name: "builtin-270-271".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            transaction_codes: vec!["270".to_string(), "271".to_string()],
            payload_type_tag: "270/271".to_string(),
            parser_factory: Arc::new(Parser270),
            schema_reference: None,
        },
        PluginDescriptor {
            name: "builtin-276-277".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            transaction_codes: vec!["276".to_string(), "277".to_string()],
            payload_type_tag: "276/277".to_string(),
            parser_factory: Arc::new(Parser276),
            schema_reference: None,
        },
    ]
}

lazy_static! {
    static ref DEFAULT_REGISTRY: RwLock<ParserRegistry> =
        RwLock::new(ParserRegistry::with_builtins());
    static ref TRANSACTION_CODE: Regex = Regex::new(r"^[0-9]{3}$").unwrap();
}

/// The process-wide default registry. Reads may be concurrent; mutations
/// take the write lock. Engines that want isolation clone a snapshot.
pub fn default_registry() -> &'static RwLock<ParserRegistry> {
    &DEFAULT_REGISTRY
}

/// The manifest shape of a plugin artifact on disk.
#[derive(Debug, Deserialize)]
struct PluginManifest {
    name: String,
    version: String,
    transaction_codes: Vec<String>,
    payload_type: String,
    /// Factory kind to bind, resolved through the [FactoryCatalog].
    parser: String,
    #[serde(default)]
    schema: Option<String>,
}

/// Load and check a single plugin artifact in a scratch scope. The live
/// registry passed in is only consulted for payload-tag distinctness and is
/// never mutated.
pub fn validate_artifact(
    path: &Path,
    catalog: &FactoryCatalog,
    registry: &ParserRegistry,
) -> Result<PluginDescriptor, Diagnostic> {
    let raw = fs::read_to_string(path).map_err(|err| {
        Diagnostic::warning(
            codes::PLUGIN_LOAD_FAILED,
            format!("unable to read plugin artifact {}: {}", path.display(), err),
        )
    })?;
    let manifest: PluginManifest = serde_json::from_str(&raw).map_err(|err| {
        Diagnostic::warning(
            codes::PLUGIN_LOAD_FAILED,
            format!("plugin artifact {} is not a valid manifest: {}", path.display(), err),
        )
    })?;

    if manifest.transaction_codes.is_empty() {
        return Err(interface_invalid(
            &manifest.name,
            "supported transaction code list is empty",
        ));
    }
    for code in &manifest.transaction_codes {
        if !TRANSACTION_CODE.is_match(code) {
            return Err(interface_invalid(
                &manifest.name,
                &format!("transaction code {:?} is not three digits", code),
            ));
        }
    }
    if registry.payload_tag_in_use(&manifest.payload_type) {
        return Err(interface_invalid(
            &manifest.name,
            &format!("payload type tag {:?} is already registered", manifest.payload_type),
        ));
    }
    let parser_factory = catalog.get(&manifest.parser).ok_or_else(|| {
        interface_invalid(
            &manifest.name,
            &format!("unknown parser factory {:?}", manifest.parser),
        )
    })?;

    Ok(PluginDescriptor {
        name: manifest.name,
        version: manifest.version,
        transaction_codes: manifest.transaction_codes,
        payload_type_tag: manifest.payload_type,
        parser_factory,
        schema_reference: manifest.schema,
    })
}

fn interface_invalid(plugin: &str, reason: &str) -> Diagnostic {
    Diagnostic::warning(
        codes::PLUGIN_INTERFACE_INVALID,
        format!("plugin {}: {}", plugin, reason),
    )
}

/// Discover plugin artifacts (`*.json` manifests) under a directory. Bad
/// artifacts are skipped with a diagnostic; discovery itself never fails
/// and never mutates any registry. Callers feed the descriptors to
/// [ParserRegistry::register].
pub fn discover(
    directory: &Path,
    catalog: &FactoryCatalog,
    registry: &ParserRegistry,
) -> (Vec<PluginDescriptor>, Vec<Diagnostic>) {
    let mut descriptors = Vec::new();
    let mut diagnostics = Vec::new();

    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(err) => {
            diagnostics.push(Diagnostic::warning(
                codes::PLUGIN_LOAD_FAILED,
                format!("unable to read plugin directory {}: {}", directory.display(), err),
            ));
            return (descriptors, diagnostics);
        }
    };

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    paths.sort();

    for path in paths {
        match validate_artifact(&path, catalog, registry) {
            Ok(descriptor) => {
                tracing::debug!(plugin = %descriptor.name, path = %path.display(), "discovered plugin");
                descriptors.push(descriptor);
            }
            Err(diagnostic) => diagnostics.push(diagnostic),
        }
    }
    (descriptors, diagnostics)
}

#[cfg(test)]
fn descriptor_named(name: &str, code: &str, tag: &str) -> PluginDescriptor {
    PluginDescriptor {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        transaction_codes: vec![code.to_string()],
        payload_type_tag: tag.to_string(),
        parser_factory: Arc::new(UntypedParser),
        schema_reference: None,
    }
}

#[test]
fn builtins_cover_the_healthcare_codes() {
    let registry = ParserRegistry::with_builtins();
    for code in ["835", "837", "270", "271", "276", "277"] {
        assert!(registry.lookup(code).is_some(), "no parser for {}", code);
    }
    assert!(registry.lookup("850").is_none());
}

#[test]
fn reregistration_is_idempotent_and_override_warns() {
    let mut registry = ParserRegistry::with_builtins();
    // same plugin, same code: no warning
    let repeat = registry.register(builtin_descriptors().remove(0));
    assert!(repeat.is_empty());

    // a different plugin claiming 835 overrides with a warning
    let diagnostics = registry.register(descriptor_named("custom-835", "835", "custom-advice"));
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, codes::PLUGIN_OVERRIDE);
    assert_eq!(
        registry
            .registered_codes()
            .iter()
            .find(|(code, _)| code == "835")
            .map(|(_, plugin)| plugin.as_str()),
        Some("custom-835")
    );
}

#[test]
fn artifact_validation_checks_the_interface() {
    use std::io::Write;
    let dir = tempfile::tempdir().unwrap();
    let catalog = FactoryCatalog::with_builtins();
    let registry = ParserRegistry::with_builtins();

    let good = dir.path().join("purchase_order.json");
    write!(
        fs::File::create(&good).unwrap(),
        r#"{{"name":"po-850","version":"0.1.0","transaction_codes":["850"],"payload_type":"850-po","parser":"untyped"}}"#
    )
    .unwrap();
    let descriptor = validate_artifact(&good, &catalog, &registry).unwrap();
    assert_eq!(descriptor.transaction_codes, vec!["850"]);

    let bad_code = dir.path().join("bad_code.json");
    write!(
        fs::File::create(&bad_code).unwrap(),
        r#"{{"name":"bad","version":"0.1.0","transaction_codes":["85"],"payload_type":"x","parser":"untyped"}}"#
    )
    .unwrap();
    let err = validate_artifact(&bad_code, &catalog, &registry).unwrap_err();
    assert_eq!(err.code, codes::PLUGIN_INTERFACE_INVALID);

    let duplicate_tag = dir.path().join("duplicate.json");
    write!(
        fs::File::create(&duplicate_tag).unwrap(),
        r#"{{"name":"dup","version":"0.1.0","transaction_codes":["850"],"payload_type":"835","parser":"untyped"}}"#
    )
    .unwrap();
    let err = validate_artifact(&duplicate_tag, &catalog, &registry).unwrap_err();
    assert_eq!(err.code, codes::PLUGIN_INTERFACE_INVALID);

    // validation must not have touched the registry
    assert!(registry.lookup("850").is_none());
}

#[test]
fn discovery_skips_bad_artifacts_and_keeps_going() {
    use std::io::Write;
    let dir = tempfile::tempdir().unwrap();
    let catalog = FactoryCatalog::with_builtins();
    let registry = ParserRegistry::new();

    write!(
        fs::File::create(dir.path().join("a_good.json")).unwrap(),
        r#"{{"name":"po-850","version":"0.1.0","transaction_codes":["850"],"payload_type":"850-po","parser":"untyped"}}"#
    )
    .unwrap();
    write!(
        fs::File::create(dir.path().join("b_broken.json")).unwrap(),
        "not json at all"
    )
    .unwrap();

    let (descriptors, diagnostics) = discover(dir.path(), &catalog, &registry);
    assert_eq!(descriptors.len(), 1);
    assert_eq!(descriptors[0].name, "po-850");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, codes::PLUGIN_LOAD_FAILED);
}
