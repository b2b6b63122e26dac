//! Incentive programs: a capability-keyed registry of the programs the
//! incentives manager announces, per-user qualification state, and the
//! referral program's registration flow.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::cfg::Cfg;
use crate::chain_client::ChainClient;
use crate::contracts::{IIncentive, IReferralIncentive};
use crate::fund::IncentiveInfo;

/// What a registered program can do. Dispatch is keyed by capability, not by
/// a hard-coded address-to-handler mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum IncentiveCapability {
    /// Answers `checkUserQualifies` and emits `UserQualified`.
    Qualification,
    /// Accepts explicit user registration (the referral program).
    Registration,
}

#[derive(Clone, Debug, Serialize)]
pub struct RegisteredIncentive {
    pub info: IncentiveInfo,
    pub capabilities: Vec<IncentiveCapability>,
}

impl RegisteredIncentive {
    pub fn has_capability(&self, capability: IncentiveCapability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Default)]
pub struct IncentiveRegistry {
    programs: Vec<RegisteredIncentive>,
}

impl IncentiveRegistry {
    pub fn register(&mut self, info: IncentiveInfo, capabilities: Vec<IncentiveCapability>) {
        if self.by_address(info.address).is_some() {
            return;
        }
        self.programs.push(RegisteredIncentive { info, capabilities });
    }

    pub fn programs(&self) -> &[RegisteredIncentive] {
        &self.programs
    }

    pub fn by_address(&self, address: Address) -> Option<&RegisteredIncentive> {
        self.programs.iter().find(|p| p.info.address == address)
    }

    pub fn with_capability(
        &self,
        capability: IncentiveCapability,
    ) -> impl Iterator<Item = &RegisteredIncentive> {
        self.programs
            .iter()
            .filter(move |p| p.has_capability(capability))
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ReferralUser {
    pub referrer: Address,
    pub referees: Vec<Address>,
}

#[derive(Clone, Debug, Serialize)]
pub struct IncentiveSnapshot {
    pub info: IncentiveInfo,
    pub capabilities: Vec<IncentiveCapability>,
    pub is_user_qualified: Option<bool>,
}

pub struct IncentiveService {
    cfg: Arc<Cfg>,
    chain: Arc<ChainClient>,
    registry: RwLock<IncentiveRegistry>,
    qualifications: RwLock<HashMap<Address, bool>>,
    registering: Mutex<bool>,
}

impl IncentiveService {
    pub fn new(cfg: Arc<Cfg>, chain: Arc<ChainClient>) -> Self {
        Self {
            cfg,
            chain,
            registry: RwLock::new(IncentiveRegistry::default()),
            qualifications: RwLock::new(HashMap::new()),
            registering: Mutex::new(false),
        }
    }

    /// Builds the registry from the programs the fund parameters announce.
    /// The configured referral program additionally carries the registration
    /// capability.
    pub async fn install(&self, incentives: &[IncentiveInfo]) {
        let mut registry = self.registry.write().await;
        for info in incentives {
            let mut capabilities = vec![IncentiveCapability::Qualification];
            if info.address == self.cfg.referral_incentive_address {
                capabilities.push(IncentiveCapability::Registration);
            }
            registry.register(info.clone(), capabilities);
        }
    }

    /// Fetches the user's qualification for every qualification-capable
    /// program. Silently no-ops without a connected wallet.
    pub async fn load_qualifications(&self) -> Result<()> {
        let Some(user) = self.chain.user_address().await else {
            return Ok(());
        };
        let addresses: Vec<Address> = {
            let registry = self.registry.read().await;
            registry
                .with_capability(IncentiveCapability::Qualification)
                .map(|p| p.info.address)
                .collect()
        };

        for address in addresses {
            let incentive = IIncentive::new(address, self.chain.provider.clone());
            let qualifies = incentive
                .checkUserQualifies(user)
                .call()
                .await
                .with_context(|| format!("checking qualification for {address}"))?;
            self.qualifications.write().await.insert(address, qualifies);
        }
        Ok(())
    }

    /// Applies a `UserQualified` event observed by the block watcher.
    pub async fn note_qualified(&self, incentive: Address) {
        if self.registry.read().await.by_address(incentive).is_none() {
            debug!("qualification event from unregistered incentive {incentive}");
            return;
        }
        self.qualifications.write().await.insert(incentive, true);
    }

    pub async fn snapshot(&self) -> Vec<IncentiveSnapshot> {
        let registry = self.registry.read().await;
        let qualifications = self.qualifications.read().await;
        registry
            .programs()
            .iter()
            .map(|p| IncentiveSnapshot {
                info: p.info.clone(),
                capabilities: p.capabilities.clone(),
                is_user_qualified: qualifications.get(&p.info.address).copied(),
            })
            .collect()
    }

    pub async fn snapshot_one(&self, address: Address) -> Option<IncentiveSnapshot> {
        let registry = self.registry.read().await;
        let program = registry.by_address(address)?;
        let is_user_qualified = self.qualifications.read().await.get(&address).copied();
        Some(IncentiveSnapshot {
            info: program.info.clone(),
            capabilities: program.capabilities.clone(),
            is_user_qualified,
        })
    }

    fn registration_program(&self, registry: &IncentiveRegistry) -> Result<Address> {
        match registry
            .with_capability(IncentiveCapability::Registration)
            .next()
        {
            Some(program) => Ok(program.info.address),
            None => bail!("no registration-capable incentive program"),
        }
    }

    /// Registers the connected user under a referrer. Silently no-ops without
    /// a wallet; the registration flag follows the usual submission pattern.
    pub async fn register_referral(&self, referrer: Address) -> Result<()> {
        let Some(wallet) = self.chain.wallet().await else {
            debug!("referral registration skipped: wallet not connected");
            return Ok(());
        };
        let program = {
            let registry = self.registry.read().await;
            self.registration_program(&registry)?
        };

        *self.registering.lock().await = true;
        let result = async {
            let referral = IReferralIncentive::new(program, wallet.provider.clone());
            let pending = referral
                .register(referrer)
                .send()
                .await
                .context("submitting referral registration")?;
            pending
                .get_receipt()
                .await
                .context("awaiting referral registration confirmation")?;
            Ok::<_, anyhow::Error>(())
        }
        .await;
        *self.registering.lock().await = false;

        result
    }

    pub async fn is_registering(&self) -> bool {
        *self.registering.lock().await
    }

    /// Referrer and referees of the connected user, if any program supports
    /// registration.
    pub async fn referral_user(&self) -> Result<Option<ReferralUser>> {
        let Some(user) = self.chain.user_address().await else {
            return Ok(None);
        };
        let program = {
            let registry = self.registry.read().await;
            self.registration_program(&registry)?
        };

        let referral = IReferralIncentive::new(program, self.chain.provider.clone());
        let ret = referral
            .getUser(user)
            .call()
            .await
            .context("fetching referral user")?;

        Ok(Some(ReferralUser {
            referrer: ret.referrer,
            referees: ret.referees,
        }))
    }

    /// Addresses of every qualification-capable program, for event draining.
    pub async fn qualification_addresses(&self) -> Vec<Address> {
        let registry = self.registry.read().await;
        registry
            .with_capability(IncentiveCapability::Qualification)
            .map(|p| p.info.address)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(byte: u8, name: &str) -> IncentiveInfo {
        IncentiveInfo {
            address: Address::repeat_byte(byte),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_registry_dispatch_by_capability() {
        let mut registry = IncentiveRegistry::default();
        registry.register(info(1, "referral"), vec![
            IncentiveCapability::Qualification,
            IncentiveCapability::Registration,
        ]);
        registry.register(info(2, "loyalty"), vec![IncentiveCapability::Qualification]);

        let qualifying: Vec<_> = registry
            .with_capability(IncentiveCapability::Qualification)
            .map(|p| p.info.name.clone())
            .collect();
        assert_eq!(qualifying, vec!["referral", "loyalty"]);

        let registering: Vec<_> = registry
            .with_capability(IncentiveCapability::Registration)
            .map(|p| p.info.name.clone())
            .collect();
        assert_eq!(registering, vec!["referral"]);
    }

    #[test]
    fn test_registry_lookup_by_address() {
        let mut registry = IncentiveRegistry::default();
        registry.register(info(1, "referral"), vec![IncentiveCapability::Qualification]);

        assert!(registry.by_address(Address::repeat_byte(1)).is_some());
        assert!(registry.by_address(Address::repeat_byte(9)).is_none());
    }

    #[test]
    fn test_registry_ignores_duplicate_registration() {
        let mut registry = IncentiveRegistry::default();
        registry.register(info(1, "referral"), vec![IncentiveCapability::Qualification]);
        registry.register(info(1, "referral again"), vec![IncentiveCapability::Registration]);

        assert_eq!(registry.programs().len(), 1);
        assert_eq!(registry.programs()[0].info.name, "referral");
    }
}
