use super::{wrap, ProtoEntity, ToEntity, UpdateType};
use crate::error::ValidationError;
use crate::p4rt::schema::{ActionInfo, MatchFieldInfo, MatchKind, SchemaIndex, TableInfo};
use crate::proto::p4runtime::{
    self, entity, field_match, table_action, FieldMatch, TableAction, TableEntry,
};
use crate::util::value::{clear_host_bits, fit, Encode};
use bytes::{Bytes, BytesMut};
use smallvec::SmallVec;
use std::fmt::Write;

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum MatchValue {
    Exact(Bytes),
    Lpm(Bytes, /*prefix_len*/ i32),
    Ternary(Bytes, /*mask*/ Bytes),
    Range(/*low*/ Bytes, /*high*/ Bytes),
}

impl MatchValue {
    pub fn kind(&self) -> MatchKind {
        match self {
            MatchValue::Exact(_) => MatchKind::Exact,
            MatchValue::Lpm(..) => MatchKind::Lpm,
            MatchValue::Ternary(..) => MatchKind::Ternary,
            MatchValue::Range(..) => MatchKind::Range,
        }
    }

    fn to_proto(&self) -> field_match::FieldMatchType {
        match self {
            MatchValue::Exact(v) => field_match::FieldMatchType::Exact(field_match::Exact {
                value: v.clone(),
            }),
            MatchValue::Lpm(v, prefix_len) => field_match::FieldMatchType::Lpm(field_match::Lpm {
                value: v.clone(),
                prefix_len: *prefix_len,
            }),
            MatchValue::Ternary(v, mask) => {
                field_match::FieldMatchType::Ternary(field_match::Ternary {
                    value: v.clone(),
                    mask: mask.clone(),
                })
            }
            MatchValue::Range(low, high) => field_match::FieldMatchType::Range(field_match::Range {
                low: low.clone(),
                high: high.clone(),
            }),
        }
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct FieldMatchSpec {
    pub field_id: u32,
    pub value: MatchValue,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct ParamSpec {
    pub param_id: u32,
    pub value: Bytes,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct ActionSpec {
    pub action_id: u32,
    pub params: SmallVec<[ParamSpec; 4]>,
}

/// A validated table entry.
///
/// Every id resolves in the [SchemaIndex] it was built against, matches are
/// ordered by field id and params by param id, and every value is in the
/// canonical width of its field.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct TableEntrySpec {
    pub table_id: u32,
    pub matches: SmallVec<[FieldMatchSpec; 3]>,
    pub action: ActionSpec,
    pub priority: i32,
    pub is_default_action: bool,
}

impl TableEntrySpec {
    pub fn to_proto(&self) -> TableEntry {
        TableEntry {
            action: Some(TableAction {
                r#type: Some(table_action::Type::Action(p4runtime::Action {
                    action_id: self.action.action_id,
                    params: self
                        .action
                        .params
                        .iter()
                        .map(|p| p4runtime::action::Param {
                            param_id: p.param_id,
                            value: p.value.clone(),
                        })
                        .collect(),
                })),
            }),
            ..self.key_proto()
        }
    }

    fn key_proto(&self) -> TableEntry {
        TableEntry {
            table_id: self.table_id,
            r#match: self
                .matches
                .iter()
                .map(|m| FieldMatch {
                    field_id: m.field_id,
                    field_match_type: Some(m.value.to_proto()),
                })
                .collect(),
            priority: self.priority,
            is_default_action: self.is_default_action,
            ..Default::default()
        }
    }

    pub fn same_key(&self, other: &TableEntrySpec) -> bool {
        self.table_id == other.table_id
            && self.matches == other.matches
            && self.priority == other.priority
            && self.is_default_action == other.is_default_action
    }

    /// Decodes an entry read back from a switch.
    pub fn from_proto(schema: &SchemaIndex, entry: &TableEntry) -> Result<Self, ValidationError> {
        let table = schema
            .table_by_id(entry.table_id)
            .ok_or(ValidationError::UnknownId {
                kind: "table",
                id: entry.table_id,
            })?;
        let mut matches: SmallVec<[FieldMatchSpec; 3]> = SmallVec::new();
        for m in &entry.r#match {
            let field = table
                .match_field_by_id(m.field_id)
                .ok_or(ValidationError::UnknownId {
                    kind: "match field",
                    id: m.field_id,
                })?;
            let refit = |v: &[u8]| fit(&field.name, v, field.bitwidth);
            let value = match &m.field_match_type {
                Some(field_match::FieldMatchType::Exact(e)) => MatchValue::Exact(refit(&e.value)?),
                Some(field_match::FieldMatchType::Lpm(l)) => {
                    MatchValue::Lpm(refit(&l.value)?, l.prefix_len)
                }
                Some(field_match::FieldMatchType::Ternary(t)) => {
                    MatchValue::Ternary(refit(&t.value)?, refit(&t.mask)?)
                }
                Some(field_match::FieldMatchType::Range(r)) => {
                    MatchValue::Range(refit(&r.low)?, refit(&r.high)?)
                }
                _ => {
                    return Err(ValidationError::Unsupported(format!(
                        "match type of {}",
                        field.name
                    )))
                }
            };
            matches.push(FieldMatchSpec {
                field_id: field.id,
                value,
            });
        }
        matches.sort_by_key(|m| m.field_id);

        let action = match entry.action.as_ref().and_then(|a| a.r#type.as_ref()) {
            Some(table_action::Type::Action(a)) => a,
            Some(_) => {
                return Err(ValidationError::Unsupported(format!(
                    "action profile entry in {}",
                    table.name
                )))
            }
            None => {
                return Err(ValidationError::MissingAction {
                    table: table.name.clone(),
                })
            }
        };
        let info = schema
            .action_by_id(action.action_id)
            .ok_or(ValidationError::UnknownId {
                kind: "action",
                id: action.action_id,
            })?;
        let mut params: SmallVec<[ParamSpec; 4]> = SmallVec::new();
        for p in &action.params {
            let param = info.param_by_id(p.param_id).ok_or(ValidationError::UnknownId {
                kind: "action param",
                id: p.param_id,
            })?;
            params.push(ParamSpec {
                param_id: param.id,
                value: fit(&param.name, &p.value, param.bitwidth)?,
            });
        }
        params.sort_by_key(|p| p.param_id);

        Ok(TableEntrySpec {
            table_id: table.id,
            matches,
            action: ActionSpec {
                action_id: info.id,
                params,
            },
            priority: entry.priority,
            is_default_action: entry.is_default_action,
        })
    }

    /// `table: field=value/len ... -> action(param=value, ...)`, names resolved
    /// through `schema` and values in hex.
    pub fn describe(&self, schema: &SchemaIndex) -> String {
        let mut out = self.describe_key(schema);
        let action = schema.action_by_id(self.action.action_id);
        let _ = write!(
            out,
            " -> {}(",
            action
                .map(|a| a.name.clone())
                .unwrap_or_else(|| self.action.action_id.to_string())
        );
        for (i, p) in self.action.params.iter().enumerate() {
            let name = action
                .and_then(|a| a.param_by_id(p.param_id))
                .map(|p| p.name.clone())
                .unwrap_or_else(|| p.param_id.to_string());
            let sep = if i == 0 { "" } else { ", " };
            let _ = write!(out, "{}{}={}", sep, name, hex::encode(&p.value));
        }
        out.push(')');
        out
    }

    pub fn describe_key(&self, schema: &SchemaIndex) -> String {
        let table = schema.table_by_id(self.table_id);
        let mut out = table
            .map(|t| t.name.clone())
            .unwrap_or_else(|| self.table_id.to_string());
        out.push(':');
        if self.is_default_action {
            out.push_str(" (default)");
        }
        for m in &self.matches {
            let name = table
                .and_then(|t| t.match_field_by_id(m.field_id))
                .map(|f| f.name.clone())
                .unwrap_or_else(|| m.field_id.to_string());
            let _ = match &m.value {
                MatchValue::Exact(v) => write!(out, " {}={}", name, hex::encode(v)),
                MatchValue::Lpm(v, len) => write!(out, " {}={}/{}", name, hex::encode(v), len),
                MatchValue::Ternary(v, mask) => {
                    write!(out, " {}={}&&&{}", name, hex::encode(v), hex::encode(mask))
                }
                MatchValue::Range(low, high) => {
                    write!(out, " {}={}..{}", name, hex::encode(low), hex::encode(high))
                }
            };
        }
        if self.priority != 0 {
            let _ = write!(out, " priority={}", self.priority);
        }
        out
    }
}

impl ToEntity for TableEntrySpec {
    fn to_proto_entity(&self) -> ProtoEntity {
        wrap(entity::Entity::TableEntry(self.to_proto()))
    }

    /// Default entries always exist, so they are modified in place.
    fn update_type(&self) -> UpdateType {
        if self.is_default_action {
            UpdateType::Modify
        } else {
            UpdateType::Insert
        }
    }

    fn key_entity(&self) -> ProtoEntity {
        wrap(entity::Entity::TableEntry(self.key_proto()))
    }

    fn is_same_as(&self, schema: &SchemaIndex, found: &ProtoEntity) -> bool {
        match &found.entity {
            Some(entity::Entity::TableEntry(entry)) => TableEntrySpec::from_proto(schema, entry)
                .map(|existing| &existing == self)
                .unwrap_or(false),
            _ => false,
        }
    }

    fn describe_key(&self, schema: &SchemaIndex) -> String {
        TableEntrySpec::describe_key(self, schema)
    }
}

/// Typed construction of a [TableEntrySpec], checked against the schema as it goes.
pub struct TableEntryBuilder<'a> {
    table: &'a TableInfo,
    schema: &'a SchemaIndex,
    matches: SmallVec<[FieldMatchSpec; 3]>,
    action: Option<(&'a ActionInfo, SmallVec<[ParamSpec; 4]>)>,
    priority: i32,
    is_default_action: bool,
}

impl SchemaIndex {
    pub fn table_entry(&self, table: &str) -> Result<TableEntryBuilder<'_>, ValidationError> {
        Ok(TableEntryBuilder {
            table: self.resolve_table(table)?,
            schema: self,
            matches: SmallVec::new(),
            action: None,
            priority: 0,
            is_default_action: false,
        })
    }
}

impl<'a> TableEntryBuilder<'a> {
    pub fn table(&self) -> &'a TableInfo {
        self.table
    }

    fn field(&self, name: &str, requested: MatchKind) -> Result<&'a MatchFieldInfo, ValidationError> {
        let table: &'a TableInfo = self.table;
        let field = table
            .match_field(name)
            .ok_or_else(|| ValidationError::UnknownMatchField {
                table: table.name.clone(),
                field: name.to_owned(),
            })?;
        if field.kind != requested {
            return Err(ValidationError::MatchKind {
                table: table.name.clone(),
                field: field.name.clone(),
                declared: field.kind,
                requested,
            });
        }
        if self.matches.iter().any(|m| m.field_id == field.id) {
            return Err(ValidationError::DuplicateMatchField {
                table: table.name.clone(),
                field: field.name.clone(),
            });
        }
        Ok(field)
    }

    pub fn match_exact<V: Encode>(mut self, name: &str, value: V) -> Result<Self, ValidationError> {
        let field = self.field(name, MatchKind::Exact)?;
        let value = fit(&field.name, &value.encode(), field.bitwidth)?;
        self.matches.push(FieldMatchSpec {
            field_id: field.id,
            value: MatchValue::Exact(value),
        });
        Ok(self)
    }

    /// A zero prefix length leaves the field out, which is how P4Runtime spells a wildcard.
    pub fn match_lpm<V: Encode>(
        mut self,
        name: &str,
        value: V,
        prefix_len: i32,
    ) -> Result<Self, ValidationError> {
        let field = self.field(name, MatchKind::Lpm)?;
        if prefix_len < 0 || prefix_len > field.bitwidth {
            return Err(ValidationError::PrefixLength {
                field: field.name.clone(),
                prefix_len,
                bitwidth: field.bitwidth,
            });
        }
        let value = fit(&field.name, &value.encode(), field.bitwidth)?;
        if prefix_len == 0 {
            return Ok(self);
        }
        self.matches.push(FieldMatchSpec {
            field_id: field.id,
            value: MatchValue::Lpm(
                clear_host_bits(&value, field.bitwidth, prefix_len),
                prefix_len,
            ),
        });
        Ok(self)
    }

    /// An all-zero mask leaves the field out.
    pub fn match_ternary<V: Encode, M: Encode>(
        mut self,
        name: &str,
        value: V,
        mask: M,
    ) -> Result<Self, ValidationError> {
        let field = self.field(name, MatchKind::Ternary)?;
        let value = fit(&field.name, &value.encode(), field.bitwidth)?;
        let mask = fit(&field.name, &mask.encode(), field.bitwidth)?;
        if mask.iter().all(|b| *b == 0) {
            return Ok(self);
        }
        let masked: BytesMut = value.iter().zip(mask.iter()).map(|(v, m)| v & m).collect();
        self.matches.push(FieldMatchSpec {
            field_id: field.id,
            value: MatchValue::Ternary(masked.freeze(), mask),
        });
        Ok(self)
    }

    pub fn match_range<V: Encode>(mut self, name: &str, low: V, high: V) -> Result<Self, ValidationError> {
        let field = self.field(name, MatchKind::Range)?;
        let low = fit(&field.name, &low.encode(), field.bitwidth)?;
        let high = fit(&field.name, &high.encode(), field.bitwidth)?;
        // same width, so byte order is numeric order
        if low > high {
            return Err(ValidationError::Unsupported(format!(
                "empty range on {}",
                field.name
            )));
        }
        self.matches.push(FieldMatchSpec {
            field_id: field.id,
            value: MatchValue::Range(low, high),
        });
        Ok(self)
    }

    pub fn action(mut self, name: &str) -> Result<Self, ValidationError> {
        let schema: &'a SchemaIndex = self.schema;
        self.action = Some((schema.resolve_action(name)?, SmallVec::new()));
        Ok(self)
    }

    pub fn param<V: Encode>(mut self, name: &str, value: V) -> Result<Self, ValidationError> {
        let table = &self.table.name;
        let (action, params) = self
            .action
            .as_mut()
            .ok_or_else(|| ValidationError::MissingAction {
                table: table.clone(),
            })?;
        let param = action
            .param(name)
            .ok_or_else(|| ValidationError::UnknownParam {
                action: action.name.clone(),
                param: name.to_owned(),
            })?;
        if params.iter().any(|p| p.param_id == param.id) {
            return Err(ValidationError::DuplicateParam {
                action: action.name.clone(),
                param: param.name.clone(),
            });
        }
        params.push(ParamSpec {
            param_id: param.id,
            value: fit(&param.name, &value.encode(), param.bitwidth)?,
        });
        Ok(self)
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn default_action(mut self) -> Self {
        self.is_default_action = true;
        self
    }

    pub fn build(self) -> Result<TableEntrySpec, ValidationError> {
        let table = self.table;
        let (action, mut params) = self.action.ok_or_else(|| ValidationError::MissingAction {
            table: table.name.clone(),
        })?;
        let not_allowed = |usage| ValidationError::ActionNotAllowed {
            table: table.name.clone(),
            action: action.name.clone(),
            usage,
        };
        let scope = table
            .action_scope(action.id)
            .ok_or_else(|| not_allowed("in any entry"))?;

        if self.is_default_action {
            if !scope.allows_default() {
                return Err(not_allowed("as the default action"));
            }
            if !self.matches.is_empty() {
                return Err(ValidationError::DefaultActionWithMatch {
                    table: table.name.clone(),
                });
            }
        } else {
            if !scope.allows_entry() {
                return Err(not_allowed("in match entries"));
            }
            if let Some(missing) = table.match_fields.iter().find(|f| {
                f.kind == MatchKind::Exact && !self.matches.iter().any(|m| m.field_id == f.id)
            }) {
                return Err(ValidationError::MissingMatchField {
                    table: table.name.clone(),
                    field: missing.name.clone(),
                });
            }
        }

        if let Some(missing) = action
            .params
            .iter()
            .find(|p| !params.iter().any(|s| s.param_id == p.id))
        {
            return Err(ValidationError::MissingParam {
                action: action.name.clone(),
                param: missing.name.clone(),
            });
        }

        let needs_priority = table.needs_priority() && !self.is_default_action;
        if needs_priority && self.priority <= 0 {
            return Err(ValidationError::PriorityRequired {
                table: table.name.clone(),
            });
        }
        if !needs_priority && self.priority != 0 {
            return Err(ValidationError::PriorityNotAllowed {
                table: table.name.clone(),
                priority: self.priority,
            });
        }

        let mut matches = self.matches;
        matches.sort_by_key(|m| m.field_id);
        params.sort_by_key(|p| p.param_id);
        Ok(TableEntrySpec {
            table_id: table.id,
            matches,
            action: ActionSpec {
                action_id: action.id,
                params,
            },
            priority: self.priority,
            is_default_action: self.is_default_action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p4rt::schema::tests::{ecn_schema, ecn_swid_schema};
    use rusty_p4_ecn_packet::MAC;
    use std::net::Ipv4Addr;

    const TERNARY_P4INFO: &str = r#"
        tables {
          preamble { id: 1 name: "acl" }
          match_fields { id: 1 name: "dst" bitwidth: 32 match_type: TERNARY }
          match_fields { id: 2 name: "port" bitwidth: 9 match_type: RANGE }
          action_refs { id: 10 }
        }
        actions { preamble { id: 10 name: "deny" } }
    "#;

    fn forward(schema: &SchemaIndex, prefix_len: i32) -> Result<TableEntrySpec, ValidationError> {
        schema
            .table_entry("MyIngress.ipv4table")?
            .match_lpm("hdr.ipv4.dstAddr", Ipv4Addr::new(10, 0, 2, 9), prefix_len)?
            .action("MyIngress.ipv4_forward")?
            .param("port", 3u16)?
            .param("dstAddr", "08:00:00:00:02:00".parse::<MAC>().unwrap())?
            .build()
    }

    #[test]
    fn build_and_decode_lpm_entry() {
        let schema = ecn_schema();
        let spec = forward(&schema, 24).unwrap();
        assert_eq!(
            spec.matches[0].value,
            MatchValue::Lpm(Bytes::from_static(&[10, 0, 2, 0]), 24)
        );
        assert_eq!(spec.action.params[0].param_id, 1);
        assert_eq!(spec.action.params[1].value.as_ref(), &[0x00, 0x03]);

        let proto = spec.to_proto();
        assert_eq!(proto.table_id, 33574068);
        assert!(!proto.is_default_action);
        let decoded = TableEntrySpec::from_proto(&schema, &proto).unwrap();
        assert_eq!(decoded, spec);
        assert_eq!(
            spec.describe(&schema),
            "MyIngress.ipv4table: hdr.ipv4.dstAddr=0a000200/24 -> MyIngress.ipv4_forward(dstAddr=080000000200, port=0003)"
        );
    }

    #[test]
    fn zero_prefix_is_a_wildcard() {
        let spec = forward(&ecn_schema(), 0).unwrap();
        assert!(spec.matches.is_empty());
        assert!(matches!(
            forward(&ecn_schema(), 33),
            Err(ValidationError::PrefixLength { prefix_len: 33, .. })
        ));
    }

    #[test]
    fn decode_accepts_short_canonical_values() {
        let schema = ecn_schema();
        let spec = forward(&schema, 32).unwrap();
        let mut proto = spec.to_proto();
        if let Some(table_action::Type::Action(a)) =
            proto.action.as_mut().and_then(|a| a.r#type.as_mut())
        {
            a.params[1].value = Bytes::from_static(&[3]);
        }
        assert_eq!(TableEntrySpec::from_proto(&schema, &proto).unwrap(), spec);
    }

    #[test]
    fn unknown_names_fail() {
        let schema = ecn_schema();
        assert_eq!(
            schema.table_entry("MyIngress.nope").err(),
            Some(ValidationError::UnknownTable("MyIngress.nope".to_owned()))
        );
        let err = schema
            .table_entry("ipv4table")
            .unwrap()
            .match_exact("hdr.ipv4.srcAddr", 1u32)
            .err();
        assert!(matches!(err, Some(ValidationError::UnknownMatchField { .. })));
        let err = schema
            .table_entry("ipv4table")
            .unwrap()
            .action("ipv4_forward")
            .unwrap()
            .param("vlan", 1u8)
            .err();
        assert!(matches!(err, Some(ValidationError::UnknownParam { .. })));
    }

    #[test]
    fn wrong_kind_and_missing_pieces() {
        let schema = ecn_schema();
        let err = schema
            .table_entry("MyIngress.ipv4table")
            .unwrap()
            .match_exact("hdr.ipv4.dstAddr", Ipv4Addr::new(10, 0, 1, 1))
            .err();
        assert!(matches!(
            err,
            Some(ValidationError::MatchKind {
                declared: MatchKind::Lpm,
                requested: MatchKind::Exact,
                ..
            })
        ));

        let err = schema
            .table_entry("MyEgress.judge_congestion")
            .unwrap()
            .action("MyEgress.set_ecn_threshold")
            .unwrap()
            .param("threshold", 10u32)
            .unwrap()
            .build()
            .err();
        assert!(matches!(err, Some(ValidationError::MissingMatchField { .. })));

        let err = schema
            .table_entry("MyEgress.judge_congestion")
            .unwrap()
            .match_exact("standard_metadata.egress_port", 3u16)
            .unwrap()
            .action("MyEgress.set_ecn_threshold")
            .unwrap()
            .build()
            .err();
        assert!(matches!(err, Some(ValidationError::MissingParam { .. })));

        let err = schema
            .table_entry("MyEgress.judge_congestion")
            .unwrap()
            .match_exact("standard_metadata.egress_port", 3u16)
            .unwrap()
            .action("MyIngress.ipv4_forward")
            .unwrap()
            .build()
            .err();
        assert!(matches!(err, Some(ValidationError::ActionNotAllowed { .. })));

        let err = schema
            .table_entry("MyEgress.judge_congestion")
            .unwrap()
            .match_exact("standard_metadata.egress_port", 3u16)
            .unwrap()
            .action("NoAction")
            .unwrap()
            .build()
            .err();
        assert!(matches!(
            err,
            Some(ValidationError::ActionNotAllowed {
                usage: "in match entries",
                ..
            })
        ));
    }

    #[test]
    fn value_range_is_checked_per_field() {
        let schema = ecn_schema();
        let err = schema
            .table_entry("MyEgress.judge_congestion")
            .unwrap()
            .match_exact("standard_metadata.egress_port", 512u16)
            .err();
        assert!(matches!(
            err,
            Some(ValidationError::ValueRange(crate::error::ValueRangeError { bitwidth: 9, .. }))
        ));
    }

    #[test]
    fn default_action_entries() {
        let schema = ecn_swid_schema();
        let spec = schema
            .table_entry("MyEgress.swid")
            .unwrap()
            .default_action()
            .action("MyEgress.set_swid")
            .unwrap()
            .param("swid", 2u8)
            .unwrap()
            .build()
            .unwrap();
        assert!(spec.is_default_action);
        assert_eq!(spec.update_type(), UpdateType::Modify);
        assert!(spec.to_proto().is_default_action);

        let err = schema
            .table_entry("MyIngress.ipv4table")
            .unwrap()
            .default_action()
            .match_lpm("hdr.ipv4.dstAddr", Ipv4Addr::new(10, 0, 0, 0), 8)
            .unwrap()
            .action("MyIngress.drop")
            .unwrap()
            .build()
            .err();
        assert!(matches!(err, Some(ValidationError::DefaultActionWithMatch { .. })));
    }

    #[test]
    fn ternary_and_range_need_priority() {
        let schema = SchemaIndex::from_text(TERNARY_P4INFO).unwrap();
        let builder = || {
            schema
                .table_entry("acl")
                .unwrap()
                .match_ternary("dst", Ipv4Addr::new(10, 0, 1, 7), Ipv4Addr::new(255, 255, 255, 0))
                .unwrap()
                .match_range("port", 1u16, 4u16)
                .unwrap()
                .action("deny")
                .unwrap()
        };
        assert!(matches!(
            builder().build(),
            Err(ValidationError::PriorityRequired { .. })
        ));
        let spec = builder().priority(10).build().unwrap();
        assert_eq!(
            spec.matches[0].value,
            MatchValue::Ternary(
                Bytes::from_static(&[10, 0, 1, 0]),
                Bytes::from_static(&[255, 255, 255, 0])
            )
        );
        assert_eq!(
            TableEntrySpec::from_proto(&schema, &spec.to_proto()).unwrap(),
            spec
        );
        assert!(matches!(
            schema
                .table_entry("acl")
                .unwrap()
                .match_range("port", 5u16, 4u16)
                .err(),
            Some(ValidationError::Unsupported(_))
        ));

        let ecn = ecn_schema();
        let err = ecn
            .table_entry("ipv4table")
            .unwrap()
            .action("drop")
            .unwrap()
            .priority(3)
            .build()
            .err();
        assert!(matches!(
            err,
            Some(ValidationError::PriorityNotAllowed { priority: 3, .. })
        ));
    }
}
