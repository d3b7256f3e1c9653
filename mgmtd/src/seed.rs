//! Demo inventory loaded at startup unless `--no-seed` is given.

use serde_json::json;

use crate::model::{
    AdminState, BitrateBounds, ConfigTree, NetworkFunction, NfType, OperState, QosProfile, Session,
    SessionState, Subscriber, SubscriberProfile, SubscriberState,
};

pub const DEMO_IMSI: &str = "001010000000001";

fn network_function(nf_type: NfType, id: &str, configuration: serde_json::Value) -> NetworkFunction {
    NetworkFunction {
        id: id.to_string(),
        nf_type,
        admin_state: AdminState::Unlocked,
        oper_state: OperState::Enabled,
        configuration,
    }
}

/// One AMF, SMF and UPF, two QoS profiles, two subscribers and one active
/// session.
pub fn demo_tree() -> ConfigTree {
    let mut tree = ConfigTree::default();

    for nf in [
        network_function(NfType::Amf, "amf-1", json!({"plmn": "00101", "tac": 1})),
        network_function(NfType::Smf, "smf-1", json!({"dnn": "internet"})),
        network_function(NfType::Upf, "upf-1", json!({"n3-address": "10.0.3.1"})),
    ] {
        tree.network_functions
            .entry(nf.nf_type)
            .or_default()
            .insert(nf.id.clone(), nf);
    }

    for qos in [
        QosProfile {
            id: "qos-default".to_string(),
            five_qi: 9,
            bitrate: BitrateBounds {
                max_uplink: 100_000,
                max_downlink: 200_000,
                ..Default::default()
            },
            priority: 90,
        },
        QosProfile {
            id: "qos-voice".to_string(),
            five_qi: 1,
            bitrate: BitrateBounds {
                guaranteed_uplink: 128,
                guaranteed_downlink: 128,
                max_uplink: 256,
                max_downlink: 256,
            },
            priority: 20,
        },
    ] {
        tree.qos_profiles.insert(qos.id.clone(), qos);
    }

    for (imsi, qos, state) in [
        (DEMO_IMSI, "qos-default", SubscriberState::Registered),
        ("001010000000002", "qos-voice", SubscriberState::Deregistered),
    ] {
        tree.subscribers.insert(
            imsi.to_string(),
            Subscriber {
                imsi: imsi.to_string(),
                profile: SubscriberProfile {
                    qos_profile_id: qos.to_string(),
                    allowed_slices: vec!["1-000001".to_string()],
                },
                state,
            },
        );
    }

    tree.sessions.insert(
        "sess-1".to_string(),
        Session {
            session_id: "sess-1".to_string(),
            subscriber_imsi: DEMO_IMSI.to_string(),
            serving_nf: "smf-1".to_string(),
            qos_profile_id: "qos-default".to_string(),
            state: SessionState::Active,
        },
    );

    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ConfigEditor, Datastore, Target};

    #[test]
    fn test_demo_tree_is_valid() {
        let store = Datastore::new(demo_tree());
        assert!(store.validate(Target::Running).is_ok());
    }
}
