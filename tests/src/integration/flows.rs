//! # Integration Test Flows
//!
//! Controllers that know nothing about each other cooperating over one
//! messenger, each through its own restricted view.
//!
//! ## Flows Tested:
//!
//! 1. **Network → GasFee**: GasFee follows `Network:stateChange` through a
//!    selector and reads `Network:getState` when the chain changes
//! 2. **Wallet → Phishing**: an asynchronous action stays pending while other
//!    calls are dispatched
//! 3. **Capability enforcement**: denied calls never reach the bus and are
//!    counted in metrics
//! 4. **Failure isolation and shutdown**

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    use crate::integration::fixtures::{gas_fee, network, GasFeeState, NetworkState};
    use controller_messenger::{Messenger, MessengerError, Value};
    use controller_telemetry::{encode_metrics, init_test_logging, register_metrics};
    use parking_lot::Mutex;
    use serde_json::json;

    // =============================================================================
    // INTEGRATION TESTS: NETWORK → GAS FEE
    // =============================================================================

    /// GasFee reacts to a chain switch and ignores unrelated network changes
    #[test]
    fn test_gas_fee_follows_chain_changes() {
        init_test_logging();
        let messenger = Messenger::new();
        let network = network(&messenger);
        let gas = gas_fee(&messenger);

        network
            .update(|s| s.provider = "infura".into())
            .expect("provider change");
        assert_eq!(gas.state().estimates_fetched, 0, "provider change must not refetch");

        network.update(|s| s.chain_id = 5).expect("chain switch");
        assert_eq!(
            *gas.state(),
            GasFeeState {
                chain_id: 5,
                estimates_fetched: 1
            }
        );

        network.update(|s| s.chain_id = 5).expect("same chain");
        assert_eq!(gas.state().estimates_fetched, 1);
    }

    /// Typed reads through a restricted view
    #[tokio::test]
    async fn test_typed_state_read() {
        let messenger = Messenger::new();
        let network = network(&messenger);
        let reader = messenger.get_restricted("Reader", ["Network:getState"], Vec::<String>::new());

        network.update(|s| s.chain_id = 137).expect("update");
        let state: NetworkState = reader
            .call_as("Network:getState", vec![])
            .await
            .expect("typed state");
        assert_eq!(state.chain_id, 137);

        let err = reader
            .call_as::<Vec<u8>>("Network:getState", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, MessengerError::InvalidPayload { .. }));
    }

    // =============================================================================
    // INTEGRATION TESTS: ASYNCHRONOUS ACTIONS AND SUBSCRIBERS
    // =============================================================================

    /// A pending action call does not stall other dispatch
    #[tokio::test]
    async fn test_async_action_does_not_stall_dispatch() {
        let messenger = Messenger::new();
        let phishing = messenger.get_restricted("Phishing", Vec::<String>::new(), Vec::<String>::new());

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let release_rx = Arc::new(Mutex::new(Some(release_rx)));
        phishing
            .register_async_action_handler("Phishing:refresh", move |_| {
                let release = release_rx.lock().take();
                async move {
                    if let Some(release) = release {
                        release.await?;
                    }
                    Ok::<_, anyhow::Error>(json!({"updated": true}))
                }
            })
            .expect("register refresh");
        phishing
            .register_action_handler("Phishing:isBlocked", |args| {
                Ok(json!(args.first().and_then(Value::as_str) == Some("evil.example")))
            })
            .expect("register check");

        let wallet = messenger.get_restricted(
            "Wallet",
            ["Phishing:refresh", "Phishing:isBlocked"],
            Vec::<String>::new(),
        );
        let pending = wallet.call("Phishing:refresh", vec![]).expect("refresh");

        let blocked = wallet
            .call("Phishing:isBlocked", vec![json!("evil.example")])
            .expect("check")
            .now_or_never()
            .expect("sync handler is ready")
            .expect("check result");
        assert_eq!(blocked, json!(true));

        release_tx.send(()).expect("release");
        let refreshed = timeout(Duration::from_millis(500), pending)
            .await
            .expect("timeout waiting for refresh")
            .expect("refresh result");
        assert_eq!(refreshed, json!({"updated": true}));
    }

    /// Async subscribers receive the state change after publish returns
    #[tokio::test]
    async fn test_async_subscriber_receives_state_change() {
        let messenger = Messenger::new();
        let network = network(&messenger);
        let tokens = messenger.get_restricted("Tokens", Vec::<String>::new(), ["Network:stateChange"]);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tokens
            .subscribe_async("Network:stateChange", move |payload| {
                let tx = tx.clone();
                async move {
                    tx.send(payload[0]["chain_id"].clone())?;
                    Ok::<(), anyhow::Error>(())
                }
            })
            .expect("subscribe");

        network.update(|s| s.chain_id = 10).expect("update");
        let chain = timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("timeout waiting for tokens")
            .expect("chain id");
        assert_eq!(chain, json!(10));
    }

    // =============================================================================
    // INTEGRATION TESTS: CAPABILITY ENFORCEMENT
    // =============================================================================

    /// Denied operations fail before reaching the bus and are counted
    #[test]
    fn test_capabilities_are_enforced_and_counted() {
        let _ = register_metrics();
        let messenger = Messenger::new();
        let _network = network(&messenger);
        let keyring = messenger.get_restricted("Keyring", Vec::<String>::new(), Vec::<String>::new());
        keyring
            .register_action_handler("Keyring:exportSeed", |_| Ok(json!("secret")))
            .expect("register");

        let tokens = messenger.get_restricted("Tokens", ["Network:getState"], Vec::<String>::new());
        assert!(matches!(
            tokens.call("Keyring:exportSeed", vec![]).unwrap_err(),
            MessengerError::ActionNotAllowed { .. }
        ));
        assert!(matches!(
            tokens.publish("Network:stateChange", vec![json!({"chain_id": 666})]).unwrap_err(),
            MessengerError::NamespaceViolation { .. }
        ));
        assert!(matches!(
            tokens.subscribe("Keyring:unlocked", |_| Ok(())).unwrap_err(),
            MessengerError::EventNotAllowed { .. }
        ));
        assert!(matches!(
            tokens
                .register_action_handler("Network:getState", |_| Ok(Value::Null))
                .unwrap_err(),
            MessengerError::NamespaceViolation { .. }
        ));
        assert!(tokens.call("Network:getState", vec![]).is_ok());

        let metrics = encode_metrics().expect("encode");
        assert!(metrics.contains("messenger_capability_denials_total"));
        assert!(metrics.contains("owner=\"Tokens\""));
    }

    // =============================================================================
    // INTEGRATION TESTS: FAILURE ISOLATION AND SHUTDOWN
    // =============================================================================

    /// A broken subscriber does not keep other controllers from updating
    #[test]
    fn test_broken_subscriber_does_not_break_the_bus() {
        init_test_logging();
        let messenger = Messenger::new();
        let network = network(&messenger);
        messenger.subscribe("Network:stateChange", |_| panic!("broken listener"));
        let gas = gas_fee(&messenger);

        network.update(|s| s.chain_id = 42).expect("update succeeds");
        assert_eq!(gas.state().chain_id, 42);
        assert_eq!(network.state().chain_id, 42);
    }

    /// Destroying a controller removes its bus surface for everyone
    #[test]
    fn test_destroyed_controller_leaves_no_callbacks() {
        let messenger = Messenger::new();
        let network = network(&messenger);
        let gas = gas_fee(&messenger);

        let cleared = network.destroy().expect("destroy");
        assert_eq!(cleared.action_handlers, 1);
        assert_eq!(messenger.subscriber_count("Network:stateChange"), 0);
        assert!(matches!(
            gas.messenger().call("Network:getState", vec![]).unwrap_err(),
            MessengerError::NoHandlerForAction { .. }
        ));

        let cleared = gas.destroy().expect("destroy gas");
        assert_eq!(cleared.action_handlers, 1);
        assert!(!messenger.has_action_handler("GasFee:getState"));
    }

    /// Persisted and anonymized projections honour metadata
    #[test]
    fn test_state_projections() {
        let messenger = Messenger::new();
        let network = network(&messenger);
        assert_eq!(
            network.anonymized_state().expect("anonymized"),
            json!({"chain_id": 1})
        );
        assert_eq!(
            network.persistent_state().expect("persisted"),
            json!({"chain_id": 1, "provider": "mainnet"})
        );
    }
}
