mod value {
    use crate::client::Value;

    #[test]
    fn undecoded_value_reencodes_byte_identically() {
        // "1.50" would round-trip as "1.5" through a float; the raw
        // fragment must survive untouched.
        let value: Value = serde_json::from_str("1.50").unwrap();
        assert_eq!(serde_json::to_string(&value).unwrap(), "1.50");
        assert_eq!(value.raw_json(), Some("1.50"));
    }

    #[test]
    fn typed_accessors() {
        let value: Value = serde_json::from_str("true").unwrap();
        assert!(value.as_bool().unwrap());

        let value: Value = serde_json::from_str("42").unwrap();
        assert_eq!(value.as_u8().unwrap(), 42);
        assert_eq!(value.as_u64().unwrap(), 42);

        let value: Value = serde_json::from_str("-7").unwrap();
        assert_eq!(value.as_i32().unwrap(), -7);

        let value: Value = serde_json::from_str("23.5").unwrap();
        assert!((value.as_f64().unwrap() - 23.5).abs() < f64::EPSILON);

        let value: Value = serde_json::from_str("\"Living Room\"").unwrap();
        assert_eq!(value.as_string().unwrap(), "Living Room");
    }

    #[test]
    fn wrong_type_is_an_error_not_a_panic() {
        let value: Value = serde_json::from_str("\"text\"").unwrap();
        let err = value.as_u8().unwrap_err();
        assert!(err.to_string().contains("u8"));
    }

    #[test]
    fn absent_and_null_values() {
        let value = Value::default();
        assert!(!value.is_present());
        assert!(value.as_bool().is_err());

        let value: Value = serde_json::from_str("null").unwrap();
        assert!(!value.is_present());
    }

    #[test]
    fn from_typed_constructor() {
        let value = Value::from_typed(&77u8).unwrap();
        assert_eq!(value.as_u8().unwrap(), 77);
        assert_eq!(value.raw_json(), Some("77"));
    }
}

mod end_to_end {
    use std::sync::Arc;

    use crate::client::{
        AccessoryClient, CharacteristicId, CharacteristicWrite, CharacteristicsReadRequest,
        CharacteristicsWriteRequest, SetupClient,
    };
    use crate::error::HapError;
    use crate::protocol::crypto::CryptoError;
    use crate::protocol::pairing::{MemoryStore, PairingEntry, PairingStore, SetupMethod};
    use crate::testing::{MockAccessory, WriteBehavior};
    use crate::types::{AccessoryPairingConfig, ControllerIdentity, IpConnectionInfo};

    const ACCESSORY_ID: &str = "5F-7A-CA-6A-83-92";
    const PIN: &str = "123-44-321";

    fn controller() -> ControllerIdentity {
        let mut identity = ControllerIdentity::generate();
        identity.device_id = "CB:1A:7E:55:44:33".into();
        identity
    }

    async fn started(accessory: &Arc<MockAccessory>) -> IpConnectionInfo {
        let addr = Arc::clone(accessory).start().await.unwrap();
        IpConnectionInfo {
            ip_address: addr.ip().to_string(),
            port: addr.port(),
        }
    }

    fn pairing_config(connection: IpConnectionInfo, pin: &str) -> AccessoryPairingConfig {
        AccessoryPairingConfig {
            device_id: ACCESSORY_ID.into(),
            pin: pin.into(),
            connection,
        }
    }

    #[tokio::test]
    async fn pair_setup_then_verify_and_request() {
        let accessory = MockAccessory::new(ACCESSORY_ID, PIN);
        *accessory.accessories_body.lock().unwrap() =
            r#"{"accessories":[{"aid":1,"services":[{"iid":1,"type":"3E","characteristics":[{"iid":2,"type":"23","value":"Thermostat","perms":["pr"]}]}]}]}"#
                .to_string();
        let connection = started(&accessory).await;

        let controller = controller();
        let store = MemoryStore::new();

        let pairing = SetupClient::new()
            .pair(
                &controller,
                &pairing_config(connection, PIN),
                SetupMethod::PairSetup,
                &store,
            )
            .await
            .unwrap();

        // The learned identity is stored under the accessory device-id
        assert_eq!(pairing.device_id, ACCESSORY_ID);
        assert_eq!(pairing.public_key.len(), 32);
        assert_eq!(pairing.public_key, accessory.public_key().to_vec());
        assert!(store.load(ACCESSORY_ID).await.unwrap().is_some());

        // A fresh connection verifies against the stored keys and serves
        // requests over the encrypted session
        let client = AccessoryClient::new(controller, pairing);
        let accessories = client.accessories().await.unwrap();
        assert_eq!(accessories.len(), 1);
        assert_eq!(accessories[0].aid, 1);
        let characteristic = &accessories[0].services[0].characteristics[0];
        assert_eq!(characteristic.value.as_string().unwrap(), "Thermostat");
    }

    #[tokio::test]
    async fn wrong_pin_fails_client_proof_check_and_stores_nothing() {
        // The accessory answers M3 with its own proof without checking the
        // client's first; the client reaches M4, finds the server proof
        // does not match its session key, and fails its local SRP check.
        let accessory = MockAccessory::new(ACCESSORY_ID, PIN);
        *accessory.enforce_client_proof.lock().unwrap() = false;
        let connection = started(&accessory).await;

        let store = MemoryStore::new();
        let err = SetupClient::new()
            .pair(
                &controller(),
                &pairing_config(connection, "000-00-000"),
                SetupMethod::PairSetup,
                &store,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, HapError::Crypto(CryptoError::SrpProof)));
        assert!(store.load(ACCESSORY_ID).await.unwrap().is_none());
        assert!(accessory.paired_controller_ids().await.is_empty());
    }

    #[tokio::test]
    async fn wrong_pin_rejected_by_strict_accessory() {
        // A strict accessory verifies the client proof in M3 and answers
        // M4 with an authentication error instead of its own proof.
        let accessory = MockAccessory::new(ACCESSORY_ID, PIN);
        let connection = started(&accessory).await;

        let store = MemoryStore::new();
        let err = SetupClient::new()
            .pair(
                &controller(),
                &pairing_config(connection, "000-00-000"),
                SetupMethod::PairSetup,
                &store,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, HapError::Accessory { code: 2, .. }));
        assert!(store.load(ACCESSORY_ID).await.unwrap().is_none());
        assert!(accessory.paired_controller_ids().await.is_empty());
    }

    async fn paired_client(
        accessory: &Arc<MockAccessory>,
    ) -> (AccessoryClient, ControllerIdentity) {
        let connection = started(accessory).await;
        let controller = controller();
        let store = MemoryStore::new();

        let pairing = SetupClient::new()
            .pair(
                &controller,
                &pairing_config(connection, PIN),
                SetupMethod::PairSetup,
                &store,
            )
            .await
            .unwrap();

        (AccessoryClient::new(controller.clone(), pairing), controller)
    }

    #[tokio::test]
    async fn characteristics_multi_status_passthrough() {
        let accessory = MockAccessory::new(ACCESSORY_ID, PIN);
        *accessory.read_response.lock().unwrap() = (
            207,
            r#"{"characteristics":[{"aid":1,"iid":10,"value":23.5},{"aid":1,"iid":11,"status":-70402}]}"#.to_string(),
        );
        let (client, _) = paired_client(&accessory).await;

        let entries = client
            .characteristics(&CharacteristicsReadRequest {
                ids: vec![
                    CharacteristicId { aid: 1, iid: 10 },
                    CharacteristicId { aid: 1, iid: 11 },
                ],
                metadata: true,
                types: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].iid, 10);
        assert!((entries[0].value.as_f64().unwrap() - 23.5).abs() < f64::EPSILON);
        assert!(entries[0].status.is_none());
        assert_eq!(entries[1].iid, 11);
        assert_eq!(entries[1].status, Some(-70402));
        assert!(!entries[1].value.is_present());
    }

    #[tokio::test]
    async fn write_no_content_synthesises_stub_entries() {
        let accessory = MockAccessory::new(ACCESSORY_ID, PIN);
        *accessory.write_behavior.lock().unwrap() = WriteBehavior::NoContent;
        let (client, _) = paired_client(&accessory).await;

        let responses = client
            .set_characteristics(&CharacteristicsWriteRequest {
                characteristics: vec![CharacteristicWrite::value(
                    CharacteristicId { aid: 1, iid: 10 },
                    serde_json::json!(true),
                )],
                prepare_id: None,
            })
            .await
            .unwrap();

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].aid, 1);
        assert_eq!(responses[0].iid, 10);
        assert!(responses[0].status.is_none());
    }

    #[tokio::test]
    async fn write_multi_status_passthrough() {
        let accessory = MockAccessory::new(ACCESSORY_ID, PIN);
        *accessory.write_behavior.lock().unwrap() = WriteBehavior::MultiStatus(
            r#"{"characteristics":[{"aid":1,"iid":10,"status":-70401}]}"#.to_string(),
        );
        let (client, _) = paired_client(&accessory).await;

        let responses = client
            .set_characteristics(&CharacteristicsWriteRequest {
                characteristics: vec![CharacteristicWrite::value(
                    CharacteristicId { aid: 1, iid: 10 },
                    serde_json::json!(22),
                )],
                prepare_id: None,
            })
            .await
            .unwrap();

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status, Some(-70401));
    }

    #[tokio::test]
    async fn list_pairings_with_three_controllers() {
        let accessory = MockAccessory::new(ACCESSORY_ID, PIN);
        accessory.preset_controller("second", [0xBB; 32], 0).await;
        accessory.preset_controller("third", [0xCC; 32], 1).await;
        let (client, controller) = paired_client(&accessory).await;

        let mut entries = client.list_pairings().await.unwrap();
        entries.sort_by(|a, b| a.device_id.cmp(&b.device_id));

        assert_eq!(entries.len(), 3);
        let ours = entries
            .iter()
            .find(|e| e.device_id == controller.device_id)
            .unwrap();
        assert!(ours.is_admin());
        assert_eq!(ours.public_key, controller.public_key);

        let second = entries.iter().find(|e| e.device_id == "second").unwrap();
        assert!(!second.is_admin());
    }

    #[tokio::test]
    async fn add_pairing_registers_controller() {
        let accessory = MockAccessory::new(ACCESSORY_ID, PIN);
        let (client, _) = paired_client(&accessory).await;

        client
            .add_pairing(&PairingEntry {
                device_id: "guest".into(),
                public_key: vec![0xDD; 32],
                permissions: 0,
            })
            .await
            .unwrap();

        assert!(accessory
            .paired_controller_ids()
            .await
            .contains(&"guest".to_string()));
    }

    #[tokio::test]
    async fn remove_other_controller_gets_status_response() {
        let accessory = MockAccessory::new(ACCESSORY_ID, PIN);
        accessory.preset_controller("guest", [0xEE; 32], 0).await;
        *accessory.reset_on_remove_self.lock().unwrap() = true;
        let (client, _) = paired_client(&accessory).await;

        // Removing someone else's pairing answers normally even with the
        // reset behaviour armed for self-removal
        client.remove_pairing("guest").await.unwrap();
        assert!(!accessory
            .paired_controller_ids()
            .await
            .contains(&"guest".to_string()));
    }

    #[tokio::test]
    async fn remove_self_with_connection_reset_is_success() {
        let accessory = MockAccessory::new(ACCESSORY_ID, PIN);
        *accessory.reset_on_remove_self.lock().unwrap() = true;
        let (client, controller) = paired_client(&accessory).await;

        client.remove_pairing(&controller.device_id).await.unwrap();

        // The accessory no longer knows us; a fresh session fails at verify
        let connection = started(&accessory).await;
        let fresh = AccessoryClient::new(
            controller.clone(),
            crate::types::AccessoryPairing {
                name: ACCESSORY_ID.into(),
                device_id: ACCESSORY_ID.into(),
                public_key: accessory.public_key().to_vec(),
                connection,
            },
        );
        let err = fresh.accessories().await.unwrap_err();
        assert!(matches!(err, HapError::Accessory { code: 2, .. }));
    }

    #[tokio::test]
    async fn closed_client_reports_cancelled() {
        let accessory = MockAccessory::new(ACCESSORY_ID, PIN);
        let (client, _) = paired_client(&accessory).await;

        client.close().await;
        let err = client.accessories().await.unwrap_err();
        assert!(matches!(err, HapError::Cancelled));
    }

    #[tokio::test]
    async fn sequential_requests_reuse_one_session() {
        let accessory = MockAccessory::new(ACCESSORY_ID, PIN);
        let (client, _) = paired_client(&accessory).await;

        // Several calls over the same encrypted connection; the per-record
        // counters keep advancing without renegotiation
        for _ in 0..3 {
            client.accessories().await.unwrap();
        }
        client.list_pairings().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_peer_from_store_lookup() {
        let store: Arc<dyn PairingStore> = Arc::new(MemoryStore::new());
        let err = AccessoryClient::from_store(controller(), store, "missing-device")
            .await
            .unwrap_err();
        assert!(matches!(err, HapError::UnknownPeer { device_id } if device_id == "missing-device"));
    }
}
