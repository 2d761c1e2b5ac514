// Plugin registry behavior observed through the public surface: overrides,
// discovery from a directory of manifests, and parsing with a registry that
// carries a plugin-registered code.

use edi_healthcare::{
    codes, discover, parse_with, validate_artifact, Delimiters, ErrorHandler, FactoryCatalog,
    HandlerPolicy, ParserRegistry, Payload, PluginDescriptor, RawSegment,
};
use pretty_assertions::assert_eq;
use std::fs;
use std::io::Write;
use std::sync::Arc;

struct FlatParser;

impl edi_healthcare::parsers::TransactionParser for FlatParser {
    fn supported_codes(&self) -> &[&'static str] {
        &["835"]
    }

    fn validate_envelope(&self, segments: &[RawSegment]) -> bool {
        segments.first().map(|s| s.is("ST")).unwrap_or(false)
    }

    fn parse(
        &self,
        segments: &[RawSegment],
        _delimiters: Delimiters,
        _handler: &mut ErrorHandler,
    ) -> Result<edi_healthcare::parsers::ParsedPayload, edi_healthcare::ParseError> {
        let value = serde_json::json!({ "segment_count": segments.len() });
        Ok(edi_healthcare::parsers::ParsedPayload::new(Payload::Custom {
            type_tag: "flat-835".to_string(),
            value,
        }))
    }
}

fn flat_descriptor() -> PluginDescriptor {
    PluginDescriptor {
        name: "flat-835".to_string(),
        version: "1.0.0".to_string(),
        transaction_codes: vec!["835".to_string()],
        payload_type_tag: "flat-835".to_string(),
        parser_factory: Arc::new(FlatParser),
        schema_reference: None,
    }
}

const MINIMAL_835: &str = concat!(
    "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *241226*1430*U*00501*000000001*0*P*>~",
    "GS*HP*SENDER*RECEIVER*20241226*1430*000000001*X*005010X221A1~",
    "ST*835*0001~",
    "BPR*I*1000.00*C*ACH~",
    "SE*3*0001~",
    "GE*1*000000001~",
    "IEA*1*000000001~"
);

#[test]
fn overriding_a_code_warns_and_the_new_parser_wins() {
    let mut registry = ParserRegistry::with_builtins();
    let diagnostics = registry.register(flat_descriptor());
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, codes::PLUGIN_OVERRIDE);

    // subsequent lookups dispatch to the replacement parser
    let outcome = parse_with(MINIMAL_835, &registry, HandlerPolicy::Collect).unwrap();
    let transaction = outcome.document.transactions().next().unwrap();
    match &transaction.payload {
        Payload::Custom { type_tag, value } => {
            assert_eq!(type_tag, "flat-835");
            assert_eq!(value["segment_count"], 3);
        }
        other => panic!("expected the plugin payload, got {:?}", other),
    }

    // registering the same plugin again is idempotent
    assert!(registry.register(flat_descriptor()).is_empty());
}

#[test]
fn discovered_manifests_register_and_parse() {
    let dir = tempfile::tempdir().unwrap();
    write!(
        fs::File::create(dir.path().join("purchase_order.json")).unwrap(),
        r#"{{"name":"po-850","version":"0.1.0","transaction_codes":["850"],"payload_type":"850-po","parser":"untyped"}}"#
    )
    .unwrap();

    let catalog = FactoryCatalog::with_builtins();
    let mut registry = ParserRegistry::with_builtins();
    let (descriptors, diagnostics) = discover(dir.path(), &catalog, &registry);
    assert!(diagnostics.is_empty());
    assert_eq!(descriptors.len(), 1);
    for descriptor in descriptors {
        registry.register(descriptor);
    }

    let input = MINIMAL_835
        .replace("ST*835*0001~", "ST*850*0001~")
        .replace("BPR*I*1000.00*C*ACH~", "BEG*00*NE*PO123~");
    let outcome = parse_with(&input, &registry, HandlerPolicy::Collect).unwrap();
    assert!(!outcome
        .diagnostics
        .iter()
        .any(|d| d.code == codes::UNKNOWN_TRANSACTION_CODE));
    let transaction = outcome.document.transactions().next().unwrap();
    assert_eq!(transaction.payload, Payload::Untyped);
    assert_eq!(transaction.segments[0].tag, "BEG");
}

#[test]
fn validation_rejects_bad_interfaces_without_touching_the_registry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty_codes.json");
    write!(
        fs::File::create(&path).unwrap(),
        r#"{{"name":"empty","version":"0.1.0","transaction_codes":[],"payload_type":"x","parser":"untyped"}}"#
    )
    .unwrap();

    let catalog = FactoryCatalog::with_builtins();
    let registry = ParserRegistry::with_builtins();
    let before = registry.registered_codes();
    let err = validate_artifact(&path, &catalog, &registry).unwrap_err();
    assert_eq!(err.code, codes::PLUGIN_INTERFACE_INVALID);
    assert_eq!(registry.registered_codes(), before);
}
