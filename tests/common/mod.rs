#![allow(dead_code)]

use protocol_registry::store::memory::CommittedState;
use protocol_registry::{
    DomainPath, EncodingType, MemoryStore, ProtocolBuilder, ProtocolDefinition, ProtocolRef,
    ProtocolRegistry, ProtocolVersion, RegistryConfig, SubmissionId,
};

pub fn soil() -> DomainPath {
    DomainPath::parse("environmental/soil").unwrap()
}

pub fn v(s: &str) -> ProtocolVersion {
    ProtocolVersion::parse(s).unwrap()
}

pub fn memory_registry() -> ProtocolRegistry<MemoryStore> {
    ProtocolRegistry::open(MemoryStore::new(), RegistryConfig::default()).unwrap()
}

/// Soil moisture reading with the given bit width
pub fn soil_moisture(bits: u32) -> ProtocolDefinition {
    ProtocolBuilder::new(soil(), "soil_moisture_percent")
        .description("Soil moisture at {depth_cm} cm is {percent} percent")
        .input("depth_cm", 10)
        .input("percent", 42)
        .encoding(EncodingType::Int, bits)
        .build()
}

pub fn soil_moisture_extending(bits: u32, parent: &str) -> ProtocolDefinition {
    let mut def = soil_moisture(bits);
    def.extends = Some(ProtocolRef::new("soil_moisture_percent", v(parent)));
    def
}

/// Push, approve and merge in one step
pub fn commit<S: protocol_registry::RegistryStore>(
    registry: &ProtocolRegistry<S>,
    definition: ProtocolDefinition,
    version: &str,
    note: &str,
) -> SubmissionId {
    let domain = definition.domain_path.clone();
    let id = registry
        .client()
        .push(definition, domain, v(version), note)
        .unwrap();
    registry.approve(&id, "reviewer").unwrap();
    let report = registry.on_merged().unwrap();
    assert!(report.is_settled(), "merge left work behind: {:?}", report);
    id
}

/// Compare committed states by payload checksum. Version equality ignores
/// pre-release and build metadata, the checksum does not.
pub fn assert_same_committed(actual: &CommittedState, expected: &CommittedState) {
    assert_eq!(
        actual.finals.keys().collect::<Vec<_>>(),
        expected.finals.keys().collect::<Vec<_>>()
    );
    assert_eq!(
        actual.archives.keys().collect::<Vec<_>>(),
        expected.archives.keys().collect::<Vec<_>>()
    );
    let pairs = actual
        .finals
        .values()
        .zip(expected.finals.values())
        .chain(actual.archives.values().zip(expected.archives.values()));
    for (a, e) in pairs {
        assert_eq!(a.checksum().unwrap(), e.checksum().unwrap(), "{}", a.reference());
    }
}
