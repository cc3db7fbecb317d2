//! Translation of forwarding, congestion and mirroring intents into entries
//! the switch understands. Everything here is pure: names are resolved
//! against a [SchemaIndex] and nothing touches the network.

use crate::entity::{ReplicaSpec, ReplicationSpec, TableEntrySpec};
use crate::error::ValidationError;
use crate::p4rt::schema::{MatchKind, SchemaIndex};
use crate::util::value::prefix_mask;
use rusty_p4_ecn_packet::MAC;
use serde::{Deserialize, Serialize};
use smallvec::smallvec;
use std::net::Ipv4Addr;

/// Usable front-panel ports of a v1model switch; 511 is the drop port.
pub const MIN_PORT: u32 = 1;
pub const MAX_PORT: u32 = 510;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardingNames {
    pub table: String,
    pub dst_field: String,
    pub action: String,
    pub mac_param: String,
    pub port_param: String,
}

impl Default for ForwardingNames {
    fn default() -> Self {
        ForwardingNames {
            table: "MyIngress.ipv4table".to_owned(),
            dst_field: "hdr.ipv4.dstAddr".to_owned(),
            action: "MyIngress.ipv4_forward".to_owned(),
            mac_param: "dstAddr".to_owned(),
            port_param: "port".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CongestionNames {
    pub table: String,
    pub port_field: String,
    pub action: String,
    pub threshold_param: String,
}

impl Default for CongestionNames {
    fn default() -> Self {
        CongestionNames {
            table: "MyEgress.judge_congestion".to_owned(),
            port_field: "standard_metadata.egress_port".to_owned(),
            action: "MyEgress.set_ecn_threshold".to_owned(),
            threshold_param: "threshold".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchIdNames {
    pub table: String,
    pub action: String,
    pub param: String,
}

impl Default for SwitchIdNames {
    fn default() -> Self {
        SwitchIdNames {
            table: "MyEgress.swid".to_owned(),
            action: "MyEgress.set_swid".to_owned(),
            param: "swid".to_owned(),
        }
    }
}

/// Names of the program objects the rules refer to.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgramNames {
    pub forwarding: ForwardingNames,
    pub congestion: CongestionNames,
    pub switch_id: SwitchIdNames,
}

fn check_port(port: u32) -> Result<(), ValidationError> {
    if (MIN_PORT..=MAX_PORT).contains(&port) {
        Ok(())
    } else {
        Err(ValidationError::Port {
            port,
            min: MIN_PORT,
            max: MAX_PORT,
        })
    }
}

/// Forwards `prefix/prefix_len` out of `port`, rewriting the destination MAC.
///
/// The declared match kind of the destination field decides the entry shape:
/// an LPM field gets the prefix as is, an exact field only takes host routes,
/// and a ternary field gets the prefix as a mask with a priority growing
/// with the prefix length.
pub fn build_forwarding_rule(
    schema: &SchemaIndex,
    names: &ProgramNames,
    prefix: Ipv4Addr,
    prefix_len: i32,
    mac: MAC,
    port: u32,
) -> Result<TableEntrySpec, ValidationError> {
    check_port(port)?;
    let n = &names.forwarding;
    let builder = schema.table_entry(&n.table)?;
    let table = builder.table();
    let field = table
        .match_field(&n.dst_field)
        .ok_or_else(|| ValidationError::UnknownMatchField {
            table: table.name.clone(),
            field: n.dst_field.clone(),
        })?;
    if prefix_len < 0 || prefix_len > field.bitwidth {
        return Err(ValidationError::PrefixLength {
            field: field.name.clone(),
            prefix_len,
            bitwidth: field.bitwidth,
        });
    }
    let builder = match field.kind {
        MatchKind::Lpm => builder.match_lpm(&n.dst_field, prefix, prefix_len)?,
        MatchKind::Exact if prefix_len == field.bitwidth => builder.match_exact(&n.dst_field, prefix)?,
        MatchKind::Ternary => {
            let mask = prefix_mask(field.bitwidth, prefix_len);
            builder
                .match_ternary(&n.dst_field, prefix, &mask[..])?
                .priority(prefix_len + 1)
        }
        declared => {
            return Err(ValidationError::MatchKind {
                table: table.name.clone(),
                field: field.name.clone(),
                declared,
                requested: MatchKind::Lpm,
            })
        }
    };
    builder
        .action(&n.action)?
        .param(&n.mac_param, mac)?
        .param(&n.port_param, port)?
        .build()
}

/// Marks packets leaving `egress_port` once its queue passes `threshold`.
pub fn build_congestion_threshold_rule(
    schema: &SchemaIndex,
    names: &ProgramNames,
    egress_port: u32,
    threshold: u32,
) -> Result<TableEntrySpec, ValidationError> {
    check_port(egress_port)?;
    let n = &names.congestion;
    schema
        .table_entry(&n.table)?
        .match_exact(&n.port_field, egress_port)?
        .action(&n.action)?
        .param(&n.threshold_param, threshold)?
        .build()
}

/// Clones packets of `session_id` to the control-plane `port`.
pub fn build_mirror_session(session_id: u32, port: u32) -> Result<ReplicationSpec, ValidationError> {
    if session_id == 0 {
        return Err(ValidationError::CloneSession("session id 0 is reserved".to_owned()));
    }
    if port == 0 {
        return Err(ValidationError::CloneSession(format!(
            "session {} has no control-plane port",
            session_id
        )));
    }
    check_port(port)?;
    Ok(ReplicationSpec {
        session_id,
        replicas: smallvec![ReplicaSpec {
            egress_port: port,
            instance: 0,
        }],
        class_of_service: 0,
    })
}

/// Default action stamping `swid` into the telemetry a switch emits.
pub fn build_switch_id_rule(
    schema: &SchemaIndex,
    names: &ProgramNames,
    swid: u32,
) -> Result<TableEntrySpec, ValidationError> {
    let n = &names.switch_id;
    schema
        .table_entry(&n.table)?
        .default_action()
        .action(&n.action)?
        .param(&n.param, swid)?
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{MatchValue, UpdateType, ToEntity};
    use crate::error::ValueRangeError;
    use crate::p4rt::schema::tests::{ecn_schema, ecn_swid_schema, ECN_P4INFO};

    fn mac(last: u8) -> MAC {
        MAC([0x08, 0, 0, 0, 0x02, last])
    }

    fn schema_with_kind(kind: &str) -> SchemaIndex {
        let text = ECN_P4INFO.replacen("match_type: LPM", &format!("match_type: {}", kind), 1);
        SchemaIndex::from_text(&text).unwrap()
    }

    #[test]
    fn lpm_forwarding() {
        let schema = ecn_schema();
        let names = ProgramNames::default();
        let rule =
            build_forwarding_rule(&schema, &names, Ipv4Addr::new(10, 0, 2, 7), 24, mac(0), 3)
                .unwrap();
        assert_eq!(
            rule.describe(&schema),
            "MyIngress.ipv4table: hdr.ipv4.dstAddr=0a000200/24 -> MyIngress.ipv4_forward(dstAddr=080000000200, port=0003)"
        );
        assert_eq!(rule.update_type(), UpdateType::Insert);
        assert_eq!(rule.priority, 0);

        let host =
            build_forwarding_rule(&schema, &names, Ipv4Addr::new(10, 0, 1, 1), 32, mac(1), 2)
                .unwrap();
        assert_eq!(
            host.matches[0].value,
            MatchValue::Lpm(bytes::Bytes::from_static(&[10, 0, 1, 1]), 32)
        );
    }

    #[test]
    fn exact_forwarding_needs_host_route() {
        let schema = schema_with_kind("EXACT");
        let names = ProgramNames::default();
        let rule =
            build_forwarding_rule(&schema, &names, Ipv4Addr::new(10, 0, 1, 1), 32, mac(1), 2)
                .unwrap();
        assert_eq!(
            rule.matches[0].value,
            MatchValue::Exact(bytes::Bytes::from_static(&[10, 0, 1, 1]))
        );

        let err = build_forwarding_rule(&schema, &names, Ipv4Addr::new(10, 0, 2, 0), 24, mac(0), 3)
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::MatchKind {
                declared: MatchKind::Exact,
                requested: MatchKind::Lpm,
                ..
            }
        ));
    }

    #[test]
    fn ternary_forwarding_masks_prefix() {
        let schema = schema_with_kind("TERNARY");
        let names = ProgramNames::default();
        let rule =
            build_forwarding_rule(&schema, &names, Ipv4Addr::new(10, 0, 2, 7), 24, mac(0), 3)
                .unwrap();
        assert_eq!(
            rule.matches[0].value,
            MatchValue::Ternary(
                bytes::Bytes::from_static(&[10, 0, 2, 0]),
                bytes::Bytes::from_static(&[0xff, 0xff, 0xff, 0])
            )
        );
        assert_eq!(rule.priority, 25);
    }

    #[test]
    fn forwarding_rejects_bad_input() {
        let schema = ecn_schema();
        let names = ProgramNames::default();
        let dst = Ipv4Addr::new(10, 0, 1, 1);
        assert_eq!(
            build_forwarding_rule(&schema, &names, dst, 33, mac(1), 2).unwrap_err(),
            ValidationError::PrefixLength {
                field: "hdr.ipv4.dstAddr".to_owned(),
                prefix_len: 33,
                bitwidth: 32
            }
        );
        assert!(build_forwarding_rule(&schema, &names, dst, -1, mac(1), 2).is_err());
        for port in &[0, 511, 4096] {
            assert_eq!(
                build_forwarding_rule(&schema, &names, dst, 32, mac(1), *port).unwrap_err(),
                ValidationError::Port {
                    port: *port,
                    min: 1,
                    max: 510
                }
            );
        }

        let mut renamed = ProgramNames::default();
        renamed.forwarding.action = "MyIngress.ipv6_forward".to_owned();
        assert_eq!(
            build_forwarding_rule(&schema, &renamed, dst, 32, mac(1), 2).unwrap_err(),
            ValidationError::UnknownAction("MyIngress.ipv6_forward".to_owned())
        );
    }

    #[test]
    fn threshold_rule() {
        let schema = ecn_schema();
        let names = ProgramNames::default();
        let rule = build_congestion_threshold_rule(&schema, &names, 3, 30).unwrap();
        assert_eq!(
            rule.describe(&schema),
            "MyEgress.judge_congestion: standard_metadata.egress_port=0003 -> MyEgress.set_ecn_threshold(threshold=00001e)"
        );

        // 19 bits
        assert!(build_congestion_threshold_rule(&schema, &names, 3, (1 << 19) - 1).is_ok());
        assert_eq!(
            build_congestion_threshold_rule(&schema, &names, 3, 1 << 19).unwrap_err(),
            ValidationError::ValueRange(ValueRangeError {
                field: "threshold".to_owned(),
                value: "00080000".to_owned(),
                needed: 20,
                bitwidth: 19,
            })
        );
    }

    #[test]
    fn mirror_session() {
        let session = build_mirror_session(100, 10).unwrap();
        assert_eq!(session.session_id, 100);
        assert_eq!(
            session.replicas.as_slice(),
            &[ReplicaSpec {
                egress_port: 10,
                instance: 0
            }]
        );
        assert_eq!(session.class_of_service, 0);
        assert!(matches!(
            build_mirror_session(0, 10),
            Err(ValidationError::CloneSession(_))
        ));
        assert!(matches!(
            build_mirror_session(100, 0),
            Err(ValidationError::CloneSession(_))
        ));
    }

    #[test]
    fn switch_id_is_a_default_entry() {
        let names = ProgramNames::default();
        let schema = ecn_swid_schema();
        let rule = build_switch_id_rule(&schema, &names, 2).unwrap();
        assert!(rule.is_default_action);
        assert!(rule.matches.is_empty());
        assert_eq!(rule.update_type(), UpdateType::Modify);

        assert_eq!(
            build_switch_id_rule(&ecn_schema(), &names, 2).unwrap_err(),
            ValidationError::UnknownTable("MyEgress.swid".to_owned())
        );
        assert!(matches!(
            build_switch_id_rule(&schema, &names, 128),
            Err(ValidationError::ValueRange(_))
        ));
    }

    #[test]
    fn names_deserialize_with_defaults() {
        let names: ProgramNames =
            serde_json::from_str(r#"{"congestion": {"threshold_param": "limit"}}"#).unwrap();
        assert_eq!(names.congestion.threshold_param, "limit");
        assert_eq!(names.congestion.table, "MyEgress.judge_congestion");
        assert_eq!(names.forwarding, ForwardingNames::default());
    }
}
