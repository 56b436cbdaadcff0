//! # Composition Flows
//!
//! A composable controller over a mix of controller generations:
//!
//! - `Network`, `GasFee`: messenger-integrated, GasFee depending on Network
//! - `Preferences`: legacy, listener-based
//!
//! Covers change propagation through chained controllers, collision
//! precedence in the flat state, patch mirroring of the composed tree, and
//! nesting one composable controller inside another.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::integration::fixtures::{gas_fee, network};
    use base_controller::{
        apply_patches, BaseController, LegacyController, LegacyOptions, Patch, StateMap,
        StateMetadata, StatefulComponent,
    };
    use composable_controller::{ComposableController, COMPOSABLE_CONTROLLER_NAME};
    use controller_messenger::{Messenger, Value};
    use controller_telemetry::init_test_logging;
    use parking_lot::Mutex;
    use serde_json::json;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn preferences() -> LegacyController {
        let mut defaults = StateMap::new();
        defaults.insert("currency".into(), json!("usd"));
        defaults.insert("provider".into(), json!("preferences-default"));
        LegacyController::new(LegacyOptions::new("Preferences").with_default_state(defaults))
    }

    fn compose_as(
        messenger: &Messenger,
        name: &str,
        children: Vec<StatefulComponent>,
    ) -> ComposableController {
        let view = messenger.get_restricted(
            name,
            Vec::<String>::new(),
            ComposableController::required_events(&children),
        );
        ComposableController::new(children, view).expect("composable controller")
    }

    fn count_events(messenger: &Messenger, event: &str) -> Arc<AtomicUsize> {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        messenger.subscribe(event, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        fired
    }

    // =============================================================================
    // INTEGRATION TESTS: MIXED GENERATIONS
    // =============================================================================

    /// A chain switch propagates Network → GasFee → composed tree
    #[test]
    fn test_chained_updates_reach_composed_state() {
        init_test_logging();
        let messenger = Messenger::new();
        let network = network(&messenger);
        let gas = gas_fee(&messenger);
        let prefs = preferences();

        let composable = compose_as(
            &messenger,
            COMPOSABLE_CONTROLLER_NAME,
            vec![network.clone().into(), gas.clone().into(), prefs.clone().into()],
        );
        let fired = count_events(&messenger, "ComposableController:stateChange");

        network.update(|s| s.chain_id = 5).expect("chain switch");

        // One absorbed update for Network, one for the GasFee it triggered.
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        let state = composable.state();
        assert_eq!(state["Network"]["chain_id"], json!(5));
        assert_eq!(state["GasFee"]["estimates_fetched"], json!(1));
    }

    /// Later children win key collisions in the flat state
    #[test]
    fn test_flat_state_precedence() {
        let messenger = Messenger::new();
        let network = network(&messenger);
        let prefs = preferences();

        let composable = compose_as(
            &messenger,
            COMPOSABLE_CONTROLLER_NAME,
            vec![network.clone().into(), prefs.clone().into()],
        );
        assert_eq!(composable.flat_state()["provider"], json!("preferences-default"));

        network
            .update(|s| s.provider = "infura".into())
            .expect("update");
        assert_eq!(composable.flat_state()["provider"], json!("preferences-default"));
        assert_eq!(composable.state()["Network"]["provider"], json!("infura"));

        let mut update = StateMap::new();
        update.insert("provider".into(), json!("custom"));
        prefs.update(update, false);
        assert_eq!(composable.flat_state()["provider"], json!("custom"));
        assert_eq!(composable.flat_state()["currency"], json!("usd"));
    }

    /// A disabled legacy child stops feeding the composed tree
    #[test]
    fn test_disabled_legacy_child() {
        let messenger = Messenger::new();
        let prefs = preferences();
        let composable = compose_as(&messenger, COMPOSABLE_CONTROLLER_NAME, vec![prefs.clone().into()]);

        prefs.set_disabled(true);
        let mut update = StateMap::new();
        update.insert("currency".into(), json!("eur"));
        prefs.update(update, false);
        assert_eq!(composable.flat_state()["currency"], json!("usd"));

        prefs.set_disabled(false);
        prefs.notify();
        assert_eq!(composable.flat_state()["currency"], json!("eur"));
    }

    // =============================================================================
    // INTEGRATION TESTS: MIRRORING AND NESTING
    // =============================================================================

    /// Subscribers can mirror the composed tree from patches alone
    #[test]
    fn test_patch_mirror_of_composed_tree() {
        let messenger = Messenger::new();
        let network = network(&messenger);
        let prefs = preferences();
        let composable = compose_as(
            &messenger,
            COMPOSABLE_CONTROLLER_NAME,
            vec![network.clone().into(), prefs.clone().into()],
        );

        let mirror = Arc::new(Mutex::new(Value::Object(StateMap::clone(&composable.state()))));
        let sink = mirror.clone();
        let view = messenger.get_restricted(
            "Mirror",
            Vec::<String>::new(),
            ["ComposableController:stateChange"],
        );
        view.subscribe("ComposableController:stateChange", move |payload| -> anyhow::Result<()> {
            let patches: Vec<Patch> = serde_json::from_value(payload[1].clone())?;
            apply_patches(&mut sink.lock(), &patches)?;
            Ok(())
        })
        .expect("subscribe");

        network.update(|s| s.chain_id = 10).expect("update");
        let mut update = StateMap::new();
        update.insert("currency".into(), json!("gbp"));
        prefs.update(update, false);

        assert_eq!(
            *mirror.lock(),
            Value::Object(StateMap::clone(&composable.state()))
        );
    }

    /// A composable controller is itself a composable child
    #[test]
    fn test_nested_composition() {
        let messenger = Messenger::new();
        let view = messenger.get_restricted("Accounts", Vec::<String>::new(), Vec::<String>::new());
        let accounts = BaseController::new(view, json!({"selected": "0x01"}), StateMetadata::new())
            .expect("accounts");

        let inner = compose_as(&messenger, "Wallet", vec![accounts.clone().into()]);
        let outer = compose_as(&messenger, "App", vec![inner.clone().into()]);
        let fired = count_events(&messenger, "App:stateChange");

        accounts
            .update(|s| s["selected"] = json!("0x02"))
            .expect("select account");

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(outer.state()["Wallet"]["Accounts"]["selected"], json!("0x02"));
        assert_eq!(outer.flat_state()["Accounts"], json!({"selected": "0x02"}));
    }

    /// Destroying the composable leaves children untouched and untracked
    #[test]
    fn test_destroy_composable() {
        let messenger = Messenger::new();
        let network = network(&messenger);
        let prefs = preferences();
        let composable = compose_as(
            &messenger,
            COMPOSABLE_CONTROLLER_NAME,
            vec![network.clone().into(), prefs.clone().into()],
        );

        composable.destroy().expect("destroy");
        assert_eq!(messenger.subscriber_count("Network:stateChange"), 0);
        assert_eq!(prefs.listener_count(), 0);
        assert!(!messenger.has_action_handler("ComposableController:getState"));

        network.update(|s| s.chain_id = 99).expect("update");
        assert_eq!(network.state().chain_id, 99);
        assert_eq!(composable.state()["Network"]["chain_id"], json!(1));
    }
}
