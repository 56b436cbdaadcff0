//! Controllers shared by the integration flows.
//!
//! `Network` owns the active chain. `GasFee` depends on it only through the
//! bus: it follows `Network:stateChange` with a selector on the chain id and
//! reads `Network:getState` when the chain switches.

use base_controller::{BaseController, PropertyMetadata, StateMetadata};
use controller_messenger::Messenger;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
    pub chain_id: u64,
    pub provider: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GasFeeState {
    pub chain_id: u64,
    pub estimates_fetched: u32,
}

pub fn network(messenger: &Messenger) -> BaseController<NetworkState> {
    let view = messenger.get_restricted("Network", Vec::<String>::new(), Vec::<String>::new());
    BaseController::new(
        view,
        NetworkState {
            chain_id: 1,
            provider: "mainnet".into(),
        },
        StateMetadata::new()
            .with("chain_id", PropertyMetadata::new(true, true))
            .with("provider", PropertyMetadata::new(true, false)),
    )
    .expect("network controller")
}

pub fn gas_fee(messenger: &Messenger) -> BaseController<GasFeeState> {
    let view = messenger.get_restricted("GasFee", ["Network:getState"], ["Network:stateChange"]);
    let gas = BaseController::new(view, GasFeeState::default(), StateMetadata::new())
        .expect("gas fee controller");

    let target = gas.clone();
    gas.messenger()
        .subscribe_with_selector(
            "Network:stateChange",
            |payload| payload[0]["chain_id"].clone(),
            move |_| -> anyhow::Result<()> {
                let state = target
                    .messenger()
                    .call("Network:getState", vec![])?
                    .now_or_never()
                    .ok_or_else(|| anyhow::anyhow!("Network:getState is pending"))??;
                let network: NetworkState = serde_json::from_value(state)?;
                target.update(|gas| {
                    gas.chain_id = network.chain_id;
                    gas.estimates_fetched += 1;
                })?;
                Ok(())
            },
        )
        .expect("subscribe to network");
    gas
}
