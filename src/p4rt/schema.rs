use crate::error::{SchemaLoadError, ValidationError};
use crate::p4rt::text_format::{self, Message};
use crate::proto::p4config::{
    action, action_ref, controller_packet_metadata, counter_spec, match_field, meter_spec, table,
    Action, ActionRef, ControllerPacketMetadata, Counter, CounterSpec, DirectCounter, MatchField,
    Meter, MeterSpec, P4Info, PkgInfo, Preamble, Table,
};
use log::debug;
use prost::Message as _;
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::path::Path;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MatchKind {
    Exact,
    Lpm,
    Ternary,
    Range,
    Optional,
    Unsupported,
}

impl MatchKind {
    fn from_proto(m: Option<&match_field::Match>) -> MatchKind {
        match m {
            Some(match_field::Match::MatchType(t)) => match match_field::MatchType::from_i32(*t) {
                Some(match_field::MatchType::Exact) => MatchKind::Exact,
                Some(match_field::MatchType::Lpm) => MatchKind::Lpm,
                Some(match_field::MatchType::Ternary) => MatchKind::Ternary,
                Some(match_field::MatchType::Range) => MatchKind::Range,
                _ => MatchKind::Unsupported,
            },
            Some(match_field::Match::OtherMatchType(name)) if name == "optional" => {
                MatchKind::Optional
            }
            _ => MatchKind::Unsupported,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActionScope {
    TableAndDefault,
    TableOnly,
    DefaultOnly,
}

impl ActionScope {
    pub fn allows_entry(self) -> bool {
        self != ActionScope::DefaultOnly
    }

    pub fn allows_default(self) -> bool {
        self != ActionScope::TableOnly
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatchFieldInfo {
    pub id: u32,
    pub name: String,
    pub bitwidth: i32,
    pub kind: MatchKind,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableInfo {
    pub id: u32,
    pub name: String,
    pub alias: String,
    pub match_fields: Vec<MatchFieldInfo>,
    pub actions: Vec<(u32, ActionScope)>,
    pub size: i64,
}

impl TableInfo {
    pub fn match_field(&self, name: &str) -> Option<&MatchFieldInfo> {
        self.match_fields.iter().find(|f| f.name == name)
    }

    pub fn match_field_by_id(&self, id: u32) -> Option<&MatchFieldInfo> {
        self.match_fields.iter().find(|f| f.id == id)
    }

    pub fn action_scope(&self, action_id: u32) -> Option<ActionScope> {
        self.actions
            .iter()
            .find(|(id, _)| *id == action_id)
            .map(|(_, scope)| *scope)
    }

    /// Tables with ternary, range or optional fields order their entries by priority.
    pub fn needs_priority(&self) -> bool {
        self.match_fields.iter().any(|f| {
            matches!(
                f.kind,
                MatchKind::Ternary | MatchKind::Range | MatchKind::Optional
            )
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParamInfo {
    pub id: u32,
    pub name: String,
    pub bitwidth: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActionInfo {
    pub id: u32,
    pub name: String,
    pub alias: String,
    pub params: Vec<ParamInfo>,
}

impl ActionInfo {
    pub fn param(&self, name: &str) -> Option<&ParamInfo> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn param_by_id(&self, id: u32) -> Option<&ParamInfo> {
        self.params.iter().find(|p| p.id == id)
    }
}

/// Name and id index over a P4Info.
///
/// Built once at startup and shared read-only afterwards. The parsed
/// [P4Info] is kept as well; it is sent again with every pipeline install.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaIndex {
    p4info: P4Info,
    tables: BTreeMap<u32, TableInfo>,
    actions: BTreeMap<u32, ActionInfo>,
    table_names: BTreeMap<String, u32>,
    action_names: BTreeMap<String, u32>,
}

fn malformed(kind: &'static str, reason: impl Into<String>) -> SchemaLoadError {
    SchemaLoadError::Malformed {
        kind,
        reason: reason.into(),
    }
}

impl SchemaIndex {
    /// `*.txt` is read as protobuf text format, `*.json` is refused,
    /// anything else is decoded as binary protobuf.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<SchemaIndex, SchemaLoadError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Err(SchemaLoadError::UnsupportedFormat { path: display }),
            Some("txt") => {
                let text = std::fs::read_to_string(path).map_err(|error| SchemaLoadError::Io {
                    path: display,
                    error,
                })?;
                Self::from_text(&text)
            }
            _ => {
                let raw = std::fs::read(path).map_err(|error| SchemaLoadError::Io {
                    path: display,
                    error,
                })?;
                Self::from_bytes(&raw)
            }
        }
    }

    pub fn from_text(text: &str) -> Result<SchemaIndex, SchemaLoadError> {
        let message = text_format::parse(text)?;
        Self::from_p4info(p4info_from_text(&message)?)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<SchemaIndex, SchemaLoadError> {
        Self::from_p4info(P4Info::decode(raw)?)
    }

    pub fn from_p4info(p4info: P4Info) -> Result<SchemaIndex, SchemaLoadError> {
        if p4info.tables.is_empty() {
            return Err(SchemaLoadError::MissingSection("tables"));
        }
        if p4info.actions.is_empty() {
            return Err(SchemaLoadError::MissingSection("actions"));
        }

        let mut actions = BTreeMap::new();
        let mut action_names = BTreeMap::new();
        for a in &p4info.actions {
            let pre = a
                .preamble
                .as_ref()
                .ok_or_else(|| malformed("action", "missing preamble"))?;
            let info = ActionInfo {
                id: pre.id,
                name: pre.name.clone(),
                alias: pre.alias.clone(),
                params: a
                    .params
                    .iter()
                    .map(|p| ParamInfo {
                        id: p.id,
                        name: p.name.clone(),
                        bitwidth: p.bitwidth,
                    })
                    .collect(),
            };
            if actions.insert(pre.id, info).is_some() {
                return Err(malformed("action", format!("duplicate id {}", pre.id)));
            }
            if action_names.insert(pre.name.clone(), pre.id).is_some() {
                return Err(malformed("action", format!("duplicate name {}", pre.name)));
            }
        }

        let mut tables = BTreeMap::new();
        let mut table_names = BTreeMap::new();
        for t in &p4info.tables {
            let pre = t
                .preamble
                .as_ref()
                .ok_or_else(|| malformed("table", "missing preamble"))?;
            let mut table_actions = vec![];
            for r in &t.action_refs {
                if !actions.contains_key(&r.id) {
                    return Err(malformed(
                        "table",
                        format!("{} refers to unknown action {}", pre.name, r.id),
                    ));
                }
                let scope = match action_ref::Scope::from_i32(r.scope) {
                    Some(action_ref::Scope::TableOnly) => ActionScope::TableOnly,
                    Some(action_ref::Scope::DefaultOnly) => ActionScope::DefaultOnly,
                    _ => ActionScope::TableAndDefault,
                };
                table_actions.push((r.id, scope));
            }
            let info = TableInfo {
                id: pre.id,
                name: pre.name.clone(),
                alias: pre.alias.clone(),
                match_fields: t
                    .match_fields
                    .iter()
                    .map(|m| MatchFieldInfo {
                        id: m.id,
                        name: m.name.clone(),
                        bitwidth: m.bitwidth,
                        kind: MatchKind::from_proto(m.r#match.as_ref()),
                    })
                    .collect(),
                actions: table_actions,
                size: t.size,
            };
            if tables.insert(pre.id, info).is_some() {
                return Err(malformed("table", format!("duplicate id {}", pre.id)));
            }
            if table_names.insert(pre.name.clone(), pre.id).is_some() {
                return Err(malformed("table", format!("duplicate name {}", pre.name)));
            }
        }

        // aliases resolve only where they do not shadow a full name
        for t in tables.values() {
            if !t.alias.is_empty() {
                table_names.entry(t.alias.clone()).or_insert(t.id);
            }
        }
        for a in actions.values() {
            if !a.alias.is_empty() {
                action_names.entry(a.alias.clone()).or_insert(a.id);
            }
        }

        Ok(SchemaIndex {
            p4info,
            tables,
            actions,
            table_names,
            action_names,
        })
    }

    pub fn p4info(&self) -> &P4Info {
        &self.p4info
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.table_names.get(name).and_then(|id| self.tables.get(id))
    }

    pub fn table_by_id(&self, id: u32) -> Option<&TableInfo> {
        self.tables.get(&id)
    }

    pub fn action(&self, name: &str) -> Option<&ActionInfo> {
        self.action_names.get(name).and_then(|id| self.actions.get(id))
    }

    pub fn action_by_id(&self, id: u32) -> Option<&ActionInfo> {
        self.actions.get(&id)
    }

    pub fn table_name(&self, id: u32) -> Option<&str> {
        self.tables.get(&id).map(|t| t.name.as_str())
    }

    pub fn action_name(&self, id: u32) -> Option<&str> {
        self.actions.get(&id).map(|a| a.name.as_str())
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableInfo> {
        self.tables.values()
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionInfo> {
        self.actions.values()
    }

    pub fn resolve_table(&self, name: &str) -> Result<&TableInfo, ValidationError> {
        self.table(name)
            .ok_or_else(|| ValidationError::UnknownTable(name.to_owned()))
    }

    pub fn resolve_action(&self, name: &str) -> Result<&ActionInfo, ValidationError> {
        self.action(name)
            .ok_or_else(|| ValidationError::UnknownAction(name.to_owned()))
    }
}

fn required_int<T: TryFrom<i64>>(
    msg: &Message,
    name: &str,
    kind: &'static str,
) -> Result<T, SchemaLoadError> {
    let v = msg
        .int(name)
        .ok_or_else(|| malformed(kind, format!("missing {}", name)))?;
    T::try_from(v).map_err(|_| malformed(kind, format!("{} {} out of range", name, v)))
}

fn optional_int<T: TryFrom<i64> + Default>(
    msg: &Message,
    name: &str,
    kind: &'static str,
) -> Result<T, SchemaLoadError> {
    match msg.int(name) {
        Some(v) => {
            T::try_from(v).map_err(|_| malformed(kind, format!("{} {} out of range", name, v)))
        }
        None => Ok(T::default()),
    }
}

fn annotations(msg: &Message) -> Vec<String> {
    msg.strs("annotations").map(str::to_owned).collect()
}

fn preamble_from_text(msg: &Message, kind: &'static str) -> Result<Preamble, SchemaLoadError> {
    let pre = msg
        .message("preamble")
        .ok_or_else(|| malformed(kind, "missing preamble"))?;
    let name = pre
        .str("name")
        .ok_or_else(|| malformed(kind, "preamble without name"))?;
    Ok(Preamble {
        id: required_int(pre, "id", kind)?,
        name: name.to_owned(),
        alias: pre.str("alias").unwrap_or_default().to_owned(),
        annotations: annotations(pre),
        ..Default::default()
    })
}

fn match_field_from_text(msg: &Message) -> Result<MatchField, SchemaLoadError> {
    let m = match (msg.ident("match_type"), msg.str("other_match_type")) {
        (Some("EXACT"), _) => match_field::Match::MatchType(match_field::MatchType::Exact as i32),
        (Some("LPM"), _) => match_field::Match::MatchType(match_field::MatchType::Lpm as i32),
        (Some("TERNARY"), _) => {
            match_field::Match::MatchType(match_field::MatchType::Ternary as i32)
        }
        (Some("RANGE"), _) => match_field::Match::MatchType(match_field::MatchType::Range as i32),
        (Some(other), _) => match_field::Match::OtherMatchType(other.to_ascii_lowercase()),
        (None, Some(other)) => match_field::Match::OtherMatchType(other.to_owned()),
        (None, None) => return Err(malformed("match field", "missing match_type")),
    };
    Ok(MatchField {
        id: required_int(msg, "id", "match field")?,
        name: msg
            .str("name")
            .ok_or_else(|| malformed("match field", "missing name"))?
            .to_owned(),
        annotations: annotations(msg),
        bitwidth: optional_int(msg, "bitwidth", "match field")?,
        r#match: Some(m),
        ..Default::default()
    })
}

fn action_ref_from_text(msg: &Message) -> Result<ActionRef, SchemaLoadError> {
    let scope = match msg.ident("scope") {
        None | Some("TABLE_AND_DEFAULT") => action_ref::Scope::TableAndDefault,
        Some("TABLE_ONLY") => action_ref::Scope::TableOnly,
        Some("DEFAULT_ONLY") => action_ref::Scope::DefaultOnly,
        Some(other) => return Err(malformed("action ref", format!("unknown scope {}", other))),
    };
    Ok(ActionRef {
        id: required_int(msg, "id", "action ref")?,
        scope: scope as i32,
        annotations: annotations(msg),
        ..Default::default()
    })
}

fn table_from_text(msg: &Message) -> Result<Table, SchemaLoadError> {
    let idle_timeout_behavior = match msg.ident("idle_timeout_behavior") {
        Some("NOTIFY_CONTROL") => table::IdleTimeoutBehavior::NotifyControl,
        _ => table::IdleTimeoutBehavior::NoTimeout,
    };
    Ok(Table {
        preamble: Some(preamble_from_text(msg, "table")?),
        match_fields: msg
            .messages("match_fields")
            .map(match_field_from_text)
            .collect::<Result<_, _>>()?,
        action_refs: msg
            .messages("action_refs")
            .map(action_ref_from_text)
            .collect::<Result<_, _>>()?,
        const_default_action_id: optional_int(msg, "const_default_action_id", "table")?,
        implementation_id: optional_int(msg, "implementation_id", "table")?,
        direct_resource_ids: msg
            .ints("direct_resource_ids")
            .map(|id| id as u32)
            .collect(),
        size: optional_int(msg, "size", "table")?,
        idle_timeout_behavior: idle_timeout_behavior as i32,
        is_const_table: msg.bool("is_const_table").unwrap_or(false),
        ..Default::default()
    })
}

fn action_from_text(msg: &Message) -> Result<Action, SchemaLoadError> {
    let params = msg
        .messages("params")
        .map(|p| -> Result<action::Param, SchemaLoadError> {
            Ok(action::Param {
                id: required_int(p, "id", "action param")?,
                name: p
                    .str("name")
                    .ok_or_else(|| malformed("action param", "missing name"))?
                    .to_owned(),
                annotations: annotations(p),
                bitwidth: optional_int(p, "bitwidth", "action param")?,
                ..Default::default()
            })
        })
        .collect::<Result<_, SchemaLoadError>>()?;
    Ok(Action {
        preamble: Some(preamble_from_text(msg, "action")?),
        params,
        ..Default::default()
    })
}

fn packet_metadata_from_text(msg: &Message) -> Result<ControllerPacketMetadata, SchemaLoadError> {
    let metadata = msg
        .messages("metadata")
        .map(|m| -> Result<controller_packet_metadata::Metadata, SchemaLoadError> {
            Ok(controller_packet_metadata::Metadata {
                id: required_int(m, "id", "packet metadata")?,
                name: m.str("name").unwrap_or_default().to_owned(),
                annotations: annotations(m),
                bitwidth: optional_int(m, "bitwidth", "packet metadata")?,
                ..Default::default()
            })
        })
        .collect::<Result<_, SchemaLoadError>>()?;
    Ok(ControllerPacketMetadata {
        preamble: Some(preamble_from_text(msg, "controller packet metadata")?),
        metadata,
        ..Default::default()
    })
}

fn counter_spec_from_text(msg: &Message) -> Option<CounterSpec> {
    let unit = match msg.message("spec")?.ident("unit") {
        Some("BYTES") => counter_spec::Unit::Bytes,
        Some("PACKETS") => counter_spec::Unit::Packets,
        Some("BOTH") => counter_spec::Unit::Both,
        _ => counter_spec::Unit::Unspecified,
    };
    Some(CounterSpec {
        unit: unit as i32,
        ..Default::default()
    })
}

fn meter_spec_from_text(msg: &Message) -> Option<MeterSpec> {
    let unit = match msg.message("spec")?.ident("unit") {
        Some("BYTES") => meter_spec::Unit::Bytes,
        Some("PACKETS") => meter_spec::Unit::Packets,
        _ => meter_spec::Unit::Unspecified,
    };
    Some(MeterSpec {
        unit: unit as i32,
        ..Default::default()
    })
}

/// Maps the sections of a text P4Info the controller knows about into [P4Info].
pub fn p4info_from_text(msg: &Message) -> Result<P4Info, SchemaLoadError> {
    let mut p4info = P4Info::default();
    for (name, value) in &msg.fields {
        let section = match value {
            text_format::Value::Message(m) => m,
            _ => return Err(malformed("p4info", format!("{} is not a message", name))),
        };
        match name.as_str() {
            "pkg_info" => {
                p4info.pkg_info = Some(PkgInfo {
                    name: section.str("name").unwrap_or_default().to_owned(),
                    version: section.str("version").unwrap_or_default().to_owned(),
                    arch: section.str("arch").unwrap_or_default().to_owned(),
                    ..Default::default()
                })
            }
            "tables" => p4info.tables.push(table_from_text(section)?),
            "actions" => p4info.actions.push(action_from_text(section)?),
            "controller_packet_metadata" => p4info
                .controller_packet_metadata
                .push(packet_metadata_from_text(section)?),
            "counters" => p4info.counters.push(Counter {
                preamble: Some(preamble_from_text(section, "counter")?),
                spec: counter_spec_from_text(section),
                size: optional_int(section, "size", "counter")?,
                ..Default::default()
            }),
            "direct_counters" => p4info.direct_counters.push(DirectCounter {
                preamble: Some(preamble_from_text(section, "direct counter")?),
                spec: counter_spec_from_text(section),
                direct_table_id: optional_int(section, "direct_table_id", "direct counter")?,
                ..Default::default()
            }),
            "meters" => p4info.meters.push(Meter {
                preamble: Some(preamble_from_text(section, "meter")?),
                spec: meter_spec_from_text(section),
                size: optional_int(section, "size", "meter")?,
                ..Default::default()
            }),
            other => debug!("skipping p4info section {}", other),
        }
    }
    Ok(p4info)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use prost::Message as _;

    pub const ECN_P4INFO: &str = include_str!("../../config/ecn.p4info.txt");
    pub const SWID_P4INFO: &str = include_str!("../../config/swid.p4info.txt");

    pub fn ecn_schema() -> SchemaIndex {
        SchemaIndex::from_text(ECN_P4INFO).unwrap()
    }

    pub fn ecn_swid_schema() -> SchemaIndex {
        SchemaIndex::from_text(&format!("{}\n{}", ECN_P4INFO, SWID_P4INFO)).unwrap()
    }

    #[test]
    fn index_ecn_program() {
        let schema = ecn_schema();
        let table = schema.table("MyIngress.ipv4table").unwrap();
        assert_eq!(table.id, 33574068);
        assert_eq!(schema.table("ipv4table").map(|t| t.id), Some(33574068));
        let field = table.match_field("hdr.ipv4.dstAddr").unwrap();
        assert_eq!((field.id, field.bitwidth, field.kind), (1, 32, MatchKind::Lpm));
        assert!(!table.needs_priority());

        let action = schema.action("MyIngress.ipv4_forward").unwrap();
        assert_eq!(action.param("dstAddr").map(|p| p.bitwidth), Some(48));
        assert_eq!(action.param_by_id(2).map(|p| p.name.as_str()), Some("port"));
        assert_eq!(table.action_scope(action.id), Some(ActionScope::TableAndDefault));

        let judge = schema.table("MyEgress.judge_congestion").unwrap();
        assert_eq!(
            judge.match_field("standard_metadata.egress_port").map(|f| f.kind),
            Some(MatchKind::Exact)
        );
        let no_action = schema.action("NoAction").unwrap().id;
        assert_eq!(judge.action_scope(no_action), Some(ActionScope::DefaultOnly));

        assert_eq!(schema.table_name(33611649), Some("MyEgress.judge_congestion"));
        assert_eq!(schema.action_name(16831479), Some("MyEgress.set_ecn_threshold"));
        assert_eq!(schema.p4info().controller_packet_metadata.len(), 1);
        assert_eq!(
            schema.p4info().pkg_info.as_ref().map(|p| p.arch.as_str()),
            Some("v1model")
        );
    }

    #[test]
    fn identical_source_identical_index() {
        assert_eq!(ecn_schema(), ecn_schema());
    }

    #[test]
    fn binary_p4info_round_trips_through_index() {
        let schema = ecn_schema();
        let mut raw = vec![];
        schema.p4info().encode(&mut raw).unwrap();
        assert_eq!(SchemaIndex::from_bytes(&raw).unwrap(), schema);
    }

    #[test]
    fn missing_sections_are_rejected() {
        let only_actions = "actions { preamble { id: 1 name: \"a\" } }";
        assert!(matches!(
            SchemaIndex::from_text(only_actions),
            Err(SchemaLoadError::MissingSection("tables"))
        ));
        let only_tables = "tables { preamble { id: 1 name: \"t\" } }";
        assert!(matches!(
            SchemaIndex::from_text(only_tables),
            Err(SchemaLoadError::MissingSection("actions"))
        ));
        let no_preamble = "tables { size: 3 }\nactions { preamble { id: 1 name: \"a\" } }";
        assert!(matches!(
            SchemaIndex::from_text(no_preamble),
            Err(SchemaLoadError::Malformed { kind: "table", .. })
        ));
    }

    #[test]
    fn dangling_action_ref_is_malformed() {
        let text = "tables { preamble { id: 1 name: \"t\" } action_refs { id: 9 } }\n\
                    actions { preamble { id: 2 name: \"a\" } }";
        assert!(matches!(
            SchemaIndex::from_text(text),
            Err(SchemaLoadError::Malformed { kind: "table", .. })
        ));
    }

    #[test]
    fn json_schema_is_unsupported() {
        assert!(matches!(
            SchemaIndex::load("build/ecn.json"),
            Err(SchemaLoadError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            SchemaIndex::load("does/not/exist.p4info.txt"),
            Err(SchemaLoadError::Io { .. })
        ));
    }
}
