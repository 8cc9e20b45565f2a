//! In-memory ledger for tests and local runs without a node.
//!
//! `MockLedger` simulates the Registry and Asset contracts at the calldata
//! level: it decodes the same selectors the gateways encode, applies the
//! contract rules, emits the same events and reverts with the same custom
//! errors. Writes that revert leave the state untouched.

use super::abi::{self, AssetCall, RegistryCall};
use super::revert::RevertReason;
use super::{LedgerClient, LedgerError, LogRecord, Receipt};
use crate::config::NumericConfig;
use crate::domain::{
    amount, derive_max_supply, AssetCreatedEvent, AssetDetails, BasisPointRate, CompanyId,
    CompanyValuation, EpochTimestamp, PlatformSnapshot, TradingStats, TradingStatus, UserHolding,
};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

const GENESIS_TIME: u64 = 1_700_000_000;
const BLOCK_TIME: u64 = 12;
const BPS_DENOMINATOR: u64 = 10_000;

#[derive(Debug, Clone)]
struct SimAsset {
    details: AssetDetails,
    valuation_set: bool,
    holdings: HashMap<Address, UserHolding>,
    total_trades: U256,
    /// Net settlement proceeds available to the company.
    reserve: U256,
}

#[derive(Debug, Clone, Default)]
struct Faults {
    fail_next_call: Option<LedgerError>,
    fail_next_send: Option<LedgerError>,
    withhold_receipts: bool,
    omit_logs: bool,
    fail_on_finalize: bool,
}

#[derive(Debug, Clone)]
struct LedgerState {
    implementation: Address,
    usdc: Address,
    valuations: HashMap<U256, CompanyValuation>,
    assets: Vec<SimAsset>,
    by_company: HashMap<U256, Address>,
    usdc_balances: HashMap<Address, U256>,
    allowances: HashMap<Address, U256>,
    receipts: HashMap<H256, Receipt>,
    withheld: HashMap<H256, Receipt>,
    default_buy_fee: BasisPointRate,
    default_sell_fee: BasisPointRate,
    clock: u64,
    block: u64,
    nonce: u64,
    faults: Faults,
}

/// In-memory Registry and Asset contracts.
#[derive(Debug)]
pub struct MockLedger {
    registry: Address,
    numeric: NumericConfig,
    state: Mutex<LedgerState>,
    calls: AtomicUsize,
    sends: AtomicUsize,
    receipt_queries: AtomicUsize,
}

impl MockLedger {
    /// Create an empty ledger whose Registry lives at `registry`.
    pub fn new(registry: Address) -> Self {
        let one_percent = BasisPointRate::new(100).unwrap_or(BasisPointRate::ZERO);
        Self {
            registry,
            numeric: NumericConfig::default(),
            state: Mutex::new(LedgerState {
                implementation: Address::from_low_u64_be(0x1111),
                usdc: Address::from_low_u64_be(0x05dc),
                valuations: HashMap::new(),
                assets: Vec::new(),
                by_company: HashMap::new(),
                usdc_balances: HashMap::new(),
                allowances: HashMap::new(),
                receipts: HashMap::new(),
                withheld: HashMap::new(),
                default_buy_fee: one_percent,
                default_sell_fee: one_percent,
                clock: GENESIS_TIME,
                block: 1,
                nonce: 0,
                faults: Faults::default(),
            }),
            calls: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
            receipt_queries: AtomicUsize::new(0),
        }
    }

    pub fn with_numeric(mut self, numeric: NumericConfig) -> Self {
        self.numeric = numeric;
        self
    }

    /// Fund `user` with settlement currency and approve the asset contracts.
    pub fn with_usdc(mut self, user: Address, balance: U256, allowance: U256) -> Self {
        let state = self.state_mut();
        state.usdc_balances.insert(user, balance);
        state.allowances.insert(user, allowance);
        self
    }

    /// Fee rates applied to newly created assets.
    pub fn with_default_fee_rates(mut self, buy: BasisPointRate, sell: BasisPointRate) -> Self {
        let state = self.state_mut();
        state.default_buy_fee = buy;
        state.default_sell_fee = sell;
        self
    }

    /// Register a pending valuation directly.
    pub fn with_valuation(mut self, valuation: CompanyValuation) -> Self {
        let state = self.state_mut();
        state
            .valuations
            .insert(valuation.company_id.as_u256(), valuation);
        self
    }

    /// Register an existing asset directly, bypassing `createAsset`.
    pub fn with_asset(mut self, details: AssetDetails, valuation_set: bool) -> Self {
        let state = self.state_mut();
        state
            .by_company
            .insert(details.company_id.as_u256(), details.asset);
        state.assets.push(SimAsset {
            details,
            valuation_set,
            holdings: HashMap::new(),
            total_trades: U256::zero(),
            reserve: U256::zero(),
        });
        self
    }

    /// The next read call fails with `err`.
    pub fn fail_next_call(&self, err: LedgerError) {
        self.lock().faults.fail_next_call = Some(err);
    }

    /// The next transaction submission fails with `err`.
    pub fn fail_next_send(&self, err: LedgerError) {
        self.lock().faults.fail_next_send = Some(err);
    }

    /// Subsequent transactions are applied but their receipts stay unavailable
    /// until [`release_receipts`](Self::release_receipts) is called.
    pub fn withhold_receipts(&self, on: bool) {
        self.lock().faults.withhold_receipts = on;
    }

    pub fn release_receipts(&self) {
        let mut state = self.lock();
        let withheld: Vec<_> = state.withheld.drain().collect();
        state.receipts.extend(withheld);
        state.faults.withhold_receipts = false;
    }

    /// Subsequent receipts carry no logs.
    pub fn omit_logs(&self, on: bool) {
        self.lock().faults.omit_logs = on;
    }

    /// Subsequent transactions are accepted but finalize with status 0.
    pub fn fail_on_finalize(&self, on: bool) {
        self.lock().faults.fail_on_finalize = on;
    }

    pub fn registry(&self) -> Address {
        self.registry
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn receipt_query_count(&self) -> usize {
        self.receipt_queries.load(Ordering::SeqCst)
    }

    /// Total I/O performed against this ledger.
    pub fn io_count(&self) -> usize {
        self.call_count() + self.send_count() + self.receipt_query_count()
    }

    pub fn usdc_balance(&self, user: Address) -> U256 {
        self.lock()
            .usdc_balances
            .get(&user)
            .copied()
            .unwrap_or_default()
    }

    /// Overwrite the `valuationSet` flag of an asset.
    pub fn set_valuation_flag(&self, asset: Address, set: bool) {
        let mut state = self.lock();
        if let Some(sim) = state.assets.iter_mut().find(|a| a.details.asset == asset) {
            sim.valuation_set = set;
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state_mut(&mut self) -> &mut LedgerState {
        self.state.get_mut().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self, state: &LedgerState, to: Address, data: &[u8]) -> Result<Bytes, RevertReason> {
        if to == self.registry {
            let call = RegistryCall::decode(data).map_err(|_| RevertReason::Unknown)?;
            return self.read_registry(state, call);
        }
        let Some(sim) = state.assets.iter().find(|a| a.details.asset == to) else {
            // No code at this address.
            return Ok(Bytes::default());
        };
        let call = AssetCall::decode(data).map_err(|_| RevertReason::Unknown)?;
        match call {
            AssetCall::GetAssetDetails => Ok(abi::encode_asset_details(&sim.details)),
            AssetCall::GetTradingStatus => Ok(abi::encode_trading_status(&TradingStatus {
                trading_active: sim.details.trading_active,
                paused: sim.details.paused,
                valuation_set: sim.valuation_set,
            })),
            AssetCall::GetTradingStats => Ok(abi::encode_trading_stats(&self.trading_stats(sim))),
            AssetCall::GetUserHolding { user } => {
                Ok(abi::encode_user_holding(&self.holding_of(sim, user)))
            }
            _ => Err(RevertReason::Unknown),
        }
    }

    fn read_registry(&self, state: &LedgerState, call: RegistryCall) -> Result<Bytes, RevertReason> {
        match call {
            RegistryCall::AssetImplementation => Ok(abi::encode_address(state.implementation)),
            RegistryCall::UsdcToken => Ok(abi::encode_address(state.usdc)),
            RegistryCall::GetCompanyValuation { company_id } => {
                let valuation = state
                    .valuations
                    .get(&company_id)
                    .cloned()
                    .unwrap_or_else(|| CompanyValuation {
                        company_id: CompanyId::new(company_id),
                        valuation: self.numeric.currency(U256::zero()),
                        initial_price: self.numeric.currency(U256::zero()),
                        evaluator: Address::zero(),
                        assessed_at: EpochTimestamp::default(),
                        exists: false,
                    });
                Ok(abi::encode_company_valuation(&valuation))
            }
            RegistryCall::GetAssetByCompany { company_id } => Ok(abi::encode_address(
                state.by_company.get(&company_id).copied().unwrap_or_default(),
            )),
            RegistryCall::GetAllAssets => {
                let all: Vec<Address> = state.assets.iter().map(|a| a.details.asset).collect();
                Ok(abi::encode_address_list(&all))
            }
            RegistryCall::GetPlatformStats => Ok(abi::encode_platform_stats(
                &self.platform_stats(state)?,
            )),
            RegistryCall::GetAssetsDetails { assets } => {
                let details = assets
                    .iter()
                    .map(|id| find_asset(state, *id).map(|a| a.details.clone()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(abi::encode_asset_details_list(&details))
            }
            RegistryCall::GetUserHoldings { assets, user } => {
                let holdings = assets
                    .iter()
                    .map(|id| find_asset(state, *id).map(|a| self.holding_of(a, user)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(abi::encode_user_holdings(&holdings))
            }
            RegistryCall::SubmitValuation { .. } | RegistryCall::CreateAsset { .. } => {
                Err(RevertReason::Unknown)
            }
        }
    }

    fn holding_of(&self, sim: &SimAsset, user: Address) -> UserHolding {
        sim.holdings
            .get(&user)
            .cloned()
            .unwrap_or_else(|| self.empty_holding(sim.details.asset, user))
    }

    fn empty_holding(&self, asset: Address, user: Address) -> UserHolding {
        let n = &self.numeric;
        UserHolding {
            asset,
            user,
            balance: n.shares(U256::zero()),
            total_purchase_value: n.currency(U256::zero()),
            total_sale_value: n.currency(U256::zero()),
            total_fees_paid: n.currency(U256::zero()),
            total_tokens_purchased: n.shares(U256::zero()),
            total_tokens_sold: n.shares(U256::zero()),
            last_trade_at: EpochTimestamp::default(),
            has_traded: false,
        }
    }

    fn trading_stats(&self, sim: &SimAsset) -> TradingStats {
        let volume = sim.details.total_volume.raw();
        let average = if sim.total_trades.is_zero() {
            U256::zero()
        } else {
            volume / sim.total_trades
        };
        TradingStats {
            total_trades: sim.total_trades,
            total_volume: self.numeric.currency(volume),
            average_trade_size: self.numeric.currency(average),
            price_volatility: U256::zero(),
        }
    }

    fn platform_stats(&self, state: &LedgerState) -> Result<PlatformSnapshot, RevertReason> {
        let mut market_cap = U256::zero();
        let mut volume = U256::zero();
        let mut circulation = U256::zero();
        let mut fees = U256::zero();
        let mut active = 0u64;
        for sim in &state.assets {
            let d = &sim.details;
            let cap = amount::mul_div(
                d.current_supply.raw(),
                d.price_per_token.raw(),
                amount::scale(self.numeric.share_decimals),
            )
            .ok_or(RevertReason::Panic(U256::from(0x11u64)))?;
            market_cap = checked(market_cap.checked_add(cap))?;
            volume = checked(volume.checked_add(d.total_volume.raw()))?;
            circulation = checked(circulation.checked_add(d.current_supply.raw()))?;
            fees = checked(fees.checked_add(d.collected_fees.raw()))?;
            if d.trading_active {
                active += 1;
            }
        }
        Ok(PlatformSnapshot {
            total_assets: U256::from(state.assets.len()),
            total_active_assets: U256::from(active),
            total_market_cap: self.numeric.currency(market_cap),
            total_volume: self.numeric.currency(volume),
            total_tokens_in_circulation: self.numeric.shares(circulation),
            total_fees_collected: self.numeric.currency(fees),
        })
    }

    fn apply(
        &self,
        state: &mut LedgerState,
        from: Address,
        to: Address,
        data: &[u8],
    ) -> Result<Vec<LogRecord>, RevertReason> {
        if to == self.registry {
            let call = RegistryCall::decode(data).map_err(|_| RevertReason::Unknown)?;
            return self.apply_registry(state, from, call);
        }
        let call = AssetCall::decode(data).map_err(|_| RevertReason::Unknown)?;
        self.apply_asset(state, from, to, call)?;
        Ok(Vec::new())
    }

    fn apply_registry(
        &self,
        state: &mut LedgerState,
        from: Address,
        call: RegistryCall,
    ) -> Result<Vec<LogRecord>, RevertReason> {
        match call {
            RegistryCall::SubmitValuation {
                company_id,
                valuation,
                initial_price,
                evaluator,
            } => {
                if state.valuations.contains_key(&company_id) {
                    return Err(RevertReason::ValuationAlreadyExists);
                }
                if valuation.is_zero() || initial_price.is_zero() {
                    return Err(RevertReason::InvalidAmount);
                }
                let record = CompanyValuation {
                    company_id: CompanyId::new(company_id),
                    valuation: self.numeric.currency(valuation),
                    initial_price: self.numeric.currency(initial_price),
                    evaluator,
                    assessed_at: EpochTimestamp::new(state.clock),
                    exists: true,
                };
                let log = abi::encode_valuation_submitted(self.registry, &record);
                state.valuations.insert(company_id, record);
                Ok(vec![log])
            }
            RegistryCall::CreateAsset {
                company_id,
                name,
                symbol,
            } => {
                let valuation = state
                    .valuations
                    .get(&company_id)
                    .cloned()
                    .ok_or(RevertReason::ValuationNotFound)?;
                if valuation.evaluator != from {
                    return Err(RevertReason::NotAuthorizedEvaluator);
                }
                if name.is_empty() || symbol.is_empty() {
                    return Err(RevertReason::InvalidAmount);
                }
                let max_supply = derive_max_supply(
                    &valuation.valuation,
                    &valuation.initial_price,
                    self.numeric.share_decimals,
                )
                .map_err(|_| RevertReason::InvalidAmount)?;

                let asset = Address::from_low_u64_be(0xa55e_7000 + state.assets.len() as u64 + 1);
                let details = AssetDetails {
                    asset,
                    company_id: CompanyId::new(company_id),
                    name: name.clone(),
                    symbol: symbol.clone(),
                    max_supply,
                    current_supply: self.numeric.shares(U256::zero()),
                    price_per_token: valuation.initial_price,
                    buy_fee_rate: state.default_buy_fee,
                    sell_fee_rate: state.default_sell_fee,
                    trading_active: false,
                    paused: false,
                    last_price_update: EpochTimestamp::new(state.clock),
                    collected_fees: self.numeric.currency(U256::zero()),
                    total_volume: self.numeric.currency(U256::zero()),
                    company: from,
                };
                state.valuations.remove(&company_id);
                state.by_company.insert(company_id, asset);
                state.assets.push(SimAsset {
                    details,
                    valuation_set: true,
                    holdings: HashMap::new(),
                    total_trades: U256::zero(),
                    reserve: U256::zero(),
                });
                Ok(vec![abi::encode_asset_created(
                    self.registry,
                    &AssetCreatedEvent {
                        company_id: CompanyId::new(company_id),
                        asset,
                        name,
                        symbol,
                        max_supply: max_supply.raw(),
                    },
                )])
            }
            _ => Err(RevertReason::Unknown),
        }
    }

    fn apply_asset(
        &self,
        state: &mut LedgerState,
        from: Address,
        to: Address,
        call: AssetCall,
    ) -> Result<(), RevertReason> {
        let clock = state.clock;
        let idx = state
            .assets
            .iter()
            .position(|a| a.details.asset == to)
            .ok_or(RevertReason::Unknown)?;
        let numeric = self.numeric;

        match call {
            AssetCall::UpdatePrice { price } => {
                if price.is_zero() {
                    return Err(RevertReason::InvalidAmount);
                }
                let d = &mut state.assets[idx].details;
                d.price_per_token = numeric.currency(price);
                d.last_price_update = EpochTimestamp::new(clock);
            }
            AssetCall::UpdateFeeRates {
                buy_fee_rate,
                sell_fee_rate,
            } => {
                let ceiling = U256::from(numeric.max_fee_rate_bps);
                if buy_fee_rate > ceiling || sell_fee_rate > ceiling {
                    return Err(RevertReason::FeeRateTooHigh);
                }
                let buy = BasisPointRate::new(buy_fee_rate.as_u64())
                    .map_err(|_| RevertReason::FeeRateTooHigh)?;
                let sell = BasisPointRate::new(sell_fee_rate.as_u64())
                    .map_err(|_| RevertReason::FeeRateTooHigh)?;
                let d = &mut state.assets[idx].details;
                d.buy_fee_rate = buy;
                d.sell_fee_rate = sell;
            }
            AssetCall::ActivateTrading => {
                let sim = &mut state.assets[idx];
                if !sim.valuation_set {
                    return Err(RevertReason::ValuationNotSet);
                }
                if sim.details.trading_active {
                    return Err(RevertReason::TradingAlreadyActive);
                }
                sim.details.trading_active = true;
            }
            AssetCall::DeactivateTrading => {
                let d = &mut state.assets[idx].details;
                if !d.trading_active {
                    return Err(RevertReason::TradingNotActive);
                }
                d.trading_active = false;
            }
            AssetCall::Pause => {
                let d = &mut state.assets[idx].details;
                if d.paused {
                    return Err(RevertReason::EnforcedPause);
                }
                d.paused = true;
            }
            AssetCall::Unpause => {
                let d = &mut state.assets[idx].details;
                if !d.paused {
                    return Err(RevertReason::ExpectedPause);
                }
                d.paused = false;
            }
            AssetCall::BuyTokens { usdc_amount } => {
                self.buy(state, idx, from, usdc_amount, clock)?;
            }
            AssetCall::SellTokens { token_amount } => {
                self.sell(state, idx, from, token_amount, clock)?;
            }
            AssetCall::WithdrawFees => {
                let fees = state.assets[idx].details.collected_fees.raw();
                if fees.is_zero() {
                    return Err(RevertReason::NoFeesToWithdraw);
                }
                state.assets[idx].details.collected_fees = numeric.currency(U256::zero());
                credit(state, from, fees)?;
            }
            AssetCall::CompanyWithdraw { amount } => {
                if amount.is_zero() {
                    return Err(RevertReason::InvalidAmount);
                }
                let sim = &mut state.assets[idx];
                if amount > sim.reserve {
                    return Err(RevertReason::InsufficientBalance);
                }
                sim.reserve -= amount;
                let company = sim.details.company;
                credit(state, company, amount)?;
            }
            AssetCall::GetAssetDetails
            | AssetCall::GetTradingStatus
            | AssetCall::GetTradingStats
            | AssetCall::GetUserHolding { .. } => {}
        }
        Ok(())
    }

    fn ensure_tradable(sim: &SimAsset) -> Result<(), RevertReason> {
        if !sim.details.trading_active {
            return Err(RevertReason::TradingNotActive);
        }
        if sim.details.paused {
            return Err(RevertReason::EnforcedPause);
        }
        Ok(())
    }

    fn buy(
        &self,
        state: &mut LedgerState,
        idx: usize,
        buyer: Address,
        usdc_amount: U256,
        clock: u64,
    ) -> Result<(), RevertReason> {
        let n = self.numeric;
        let sim = &state.assets[idx];
        Self::ensure_tradable(sim)?;
        if usdc_amount.is_zero() {
            return Err(RevertReason::InvalidAmount);
        }
        let d = &sim.details;
        let fee = fee_of(usdc_amount, d.buy_fee_rate)?;
        let net = usdc_amount - fee;
        let tokens = amount::mul_div(net, amount::scale(n.share_decimals), d.price_per_token.raw())
            .ok_or(RevertReason::InvalidAmount)?;
        if tokens.is_zero() {
            return Err(RevertReason::InvalidAmount);
        }
        let new_supply = checked(d.current_supply.raw().checked_add(tokens))?;
        if new_supply > d.max_supply.raw() {
            return Err(RevertReason::MaxSupplyReached);
        }

        let asset = d.asset;
        let allowance = state.allowances.get(&buyer).copied().unwrap_or_default();
        if allowance < usdc_amount {
            return Err(RevertReason::Erc20InsufficientAllowance {
                spender: asset,
                allowance,
                needed: usdc_amount,
            });
        }
        let balance = state.usdc_balances.get(&buyer).copied().unwrap_or_default();
        if balance < usdc_amount {
            return Err(RevertReason::Erc20InsufficientBalance {
                sender: buyer,
                balance,
                needed: usdc_amount,
            });
        }
        state.allowances.insert(buyer, allowance - usdc_amount);
        state.usdc_balances.insert(buyer, balance - usdc_amount);

        let holding = self.holding_of(&state.assets[idx], buyer);
        let sim = &mut state.assets[idx];
        let updated = UserHolding {
            balance: n.shares(checked(holding.balance.raw().checked_add(tokens))?),
            total_purchase_value: n.currency(checked(
                holding.total_purchase_value.raw().checked_add(net),
            )?),
            total_fees_paid: n.currency(checked(holding.total_fees_paid.raw().checked_add(fee))?),
            total_tokens_purchased: n.shares(checked(
                holding.total_tokens_purchased.raw().checked_add(tokens),
            )?),
            last_trade_at: EpochTimestamp::new(clock),
            has_traded: true,
            ..holding
        };
        sim.holdings.insert(buyer, updated);
        sim.details.current_supply = n.shares(new_supply);
        sim.details.collected_fees =
            n.currency(checked(sim.details.collected_fees.raw().checked_add(fee))?);
        sim.details.total_volume =
            n.currency(checked(sim.details.total_volume.raw().checked_add(usdc_amount))?);
        sim.reserve = checked(sim.reserve.checked_add(net))?;
        sim.total_trades += U256::one();
        Ok(())
    }

    fn sell(
        &self,
        state: &mut LedgerState,
        idx: usize,
        seller: Address,
        token_amount: U256,
        clock: u64,
    ) -> Result<(), RevertReason> {
        let n = self.numeric;
        let sim = &state.assets[idx];
        Self::ensure_tradable(sim)?;
        if token_amount.is_zero() {
            return Err(RevertReason::InvalidAmount);
        }
        let holding = self.holding_of(sim, seller);
        if holding.balance.raw() < token_amount {
            return Err(RevertReason::Erc20InsufficientBalance {
                sender: seller,
                balance: holding.balance.raw(),
                needed: token_amount,
            });
        }
        let gross = amount::mul_div(
            token_amount,
            sim.details.price_per_token.raw(),
            amount::scale(n.share_decimals),
        )
        .ok_or(RevertReason::InvalidAmount)?;
        let fee = fee_of(gross, sim.details.sell_fee_rate)?;
        let payout = gross - fee;
        if gross > sim.reserve {
            return Err(RevertReason::InsufficientBalance);
        }

        let sim = &mut state.assets[idx];
        let updated = UserHolding {
            balance: n.shares(holding.balance.raw() - token_amount),
            total_sale_value: n.currency(checked(
                holding.total_sale_value.raw().checked_add(payout),
            )?),
            total_fees_paid: n.currency(checked(holding.total_fees_paid.raw().checked_add(fee))?),
            total_tokens_sold: n.shares(checked(
                holding.total_tokens_sold.raw().checked_add(token_amount),
            )?),
            last_trade_at: EpochTimestamp::new(clock),
            has_traded: true,
            ..holding
        };
        sim.holdings.insert(seller, updated);
        sim.details.current_supply = n.shares(sim.details.current_supply.raw() - token_amount);
        sim.details.collected_fees =
            n.currency(checked(sim.details.collected_fees.raw().checked_add(fee))?);
        sim.details.total_volume =
            n.currency(checked(sim.details.total_volume.raw().checked_add(gross))?);
        sim.reserve -= gross;
        sim.total_trades += U256::one();
        credit(state, seller, payout)
    }
}

fn find_asset(state: &LedgerState, id: Address) -> Result<&SimAsset, RevertReason> {
    state
        .assets
        .iter()
        .find(|a| a.details.asset == id)
        .ok_or(RevertReason::Unknown)
}

fn fee_of(amount: U256, rate: BasisPointRate) -> Result<U256, RevertReason> {
    amount::mul_div(amount, rate.as_u256(), U256::from(BPS_DENOMINATOR))
        .ok_or(RevertReason::Panic(U256::from(0x11u64)))
}

fn checked(value: Option<U256>) -> Result<U256, RevertReason> {
    // 0x11: arithmetic overflow panic code.
    value.ok_or(RevertReason::Panic(U256::from(0x11u64)))
}

fn credit(state: &mut LedgerState, user: Address, amount: U256) -> Result<(), RevertReason> {
    let balance = state.usdc_balances.entry(user).or_default();
    *balance = checked(balance.checked_add(amount))?;
    Ok(())
}

fn reverted(reason: RevertReason) -> LedgerError {
    LedgerError::Reverted {
        data: reason.encode(),
        message: "execution reverted".to_string(),
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if let Some(err) = state.faults.fail_next_call.take() {
            return Err(err);
        }
        self.read(&state, to, &data).map_err(reverted)
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<H256, LedgerError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if let Some(err) = state.faults.fail_next_send.take() {
            return Err(err);
        }

        let mut next = state.clone();
        let logs = self.apply(&mut next, from, to, &data).map_err(reverted)?;

        state.nonce += 1;
        let mut seed = from.as_bytes().to_vec();
        seed.extend_from_slice(&state.nonce.to_be_bytes());
        let tx_hash = H256::from(keccak256(seed));
        state.clock += BLOCK_TIME;
        state.block += 1;

        let faults = state.faults.clone();
        if !faults.fail_on_finalize {
            let (nonce, clock, block) = (state.nonce, state.clock, state.block);
            *state = next;
            state.nonce = nonce;
            state.clock = clock;
            state.block = block;
        }

        let receipt = Receipt {
            tx_hash,
            block_number: Some(state.block),
            status: Some(if faults.fail_on_finalize { 0 } else { 1 }),
            logs: if faults.omit_logs || faults.fail_on_finalize {
                Vec::new()
            } else {
                logs
            },
        };
        if faults.withhold_receipts {
            state.withheld.insert(tx_hash, receipt);
        } else {
            state.receipts.insert(tx_hash, receipt);
        }
        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<Receipt>, LedgerError> {
        self.receipt_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.lock().receipts.get(&tx_hash).cloned())
    }
}
