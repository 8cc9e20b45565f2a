//! Static bindings for the Registry and Asset contracts.
//!
//! Every operation is declared once here as a typed call variant with a fixed
//! Solidity signature. Selectors, calldata, return decoding and event topics
//! are all derived from these declarations.

use crate::config::NumericConfig;
use crate::domain::{
    AssetCreatedEvent, AssetDetails, BasisPointRate, CompanyId, CompanyValuation,
    EpochTimestamp, PlatformSnapshot, TradingStats, TradingStatus, UserHolding,
};
use crate::ledger::LogRecord;
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiDecodeError {
    #[error("abi decoding failed: {0}")]
    Abi(String),
    #[error("payload shorter than a selector")]
    TooShort,
    #[error("unknown selector 0x{0}")]
    UnknownSelector(String),
    #[error("missing field in decoded tuple")]
    MissingField,
    #[error("expected {0} token")]
    TypeMismatch(&'static str),
    #[error("log is not the expected event")]
    WrongEvent,
    #[error("value out of range for field {0}")]
    OutOfRange(&'static str),
}

impl From<abi::Error> for AbiDecodeError {
    fn from(err: abi::Error) -> Self {
        AbiDecodeError::Abi(err.to_string())
    }
}

pub mod sig {
    pub const ASSET_IMPLEMENTATION: &str = "assetImplementation()";
    pub const USDC_TOKEN: &str = "usdcToken()";
    pub const GET_COMPANY_VALUATION: &str = "getCompanyValuation(uint256)";
    pub const GET_ASSET_BY_COMPANY: &str = "getAssetByCompany(uint256)";
    pub const GET_ALL_ASSETS: &str = "getAllAssets()";
    pub const GET_PLATFORM_STATS: &str = "getPlatformStats()";
    pub const GET_ASSETS_DETAILS: &str = "getAssetsDetails(address[])";
    pub const GET_USER_HOLDINGS: &str = "getUserHoldings(address[],address)";
    pub const SUBMIT_VALUATION: &str = "submitValuation(uint256,uint256,uint256,address)";
    pub const CREATE_ASSET: &str = "createAsset(uint256,string,string)";

    pub const GET_ASSET_DETAILS: &str = "getAssetDetails()";
    pub const GET_TRADING_STATUS: &str = "getTradingStatus()";
    pub const GET_TRADING_STATS: &str = "getTradingStats()";
    pub const GET_USER_HOLDING: &str = "getUserHolding(address)";
    pub const UPDATE_PRICE: &str = "updatePrice(uint256)";
    pub const UPDATE_FEE_RATES: &str = "updateFeeRates(uint256,uint256)";
    pub const ACTIVATE_TRADING: &str = "activateTrading()";
    pub const DEACTIVATE_TRADING: &str = "deactivateTrading()";
    pub const PAUSE: &str = "pause()";
    pub const UNPAUSE: &str = "unpause()";
    pub const BUY_TOKENS: &str = "buyTokens(uint256)";
    pub const SELL_TOKENS: &str = "sellTokens(uint256)";
    pub const WITHDRAW_FEES: &str = "withdrawFees()";
    pub const COMPANY_WITHDRAW: &str = "companyWithdraw(uint256)";

    pub const ASSET_CREATED_EVENT: &str = "AssetCreated(uint256,address,string,string,uint256)";
    pub const VALUATION_SUBMITTED_EVENT: &str = "ValuationSubmitted(uint256,address,uint256,uint256)";

    pub(super) const REGISTRY: &[&str] = &[
        ASSET_IMPLEMENTATION,
        USDC_TOKEN,
        GET_COMPANY_VALUATION,
        GET_ASSET_BY_COMPANY,
        GET_ALL_ASSETS,
        GET_PLATFORM_STATS,
        GET_ASSETS_DETAILS,
        GET_USER_HOLDINGS,
        SUBMIT_VALUATION,
        CREATE_ASSET,
    ];

    pub(super) const ASSET: &[&str] = &[
        GET_ASSET_DETAILS,
        GET_TRADING_STATUS,
        GET_TRADING_STATS,
        GET_USER_HOLDING,
        UPDATE_PRICE,
        UPDATE_FEE_RATES,
        ACTIVATE_TRADING,
        DEACTIVATE_TRADING,
        PAUSE,
        UNPAUSE,
        BUY_TOKENS,
        SELL_TOKENS,
        WITHDRAW_FEES,
        COMPANY_WITHDRAW,
    ];
}

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn event_topic(signature: &str) -> H256 {
    H256::from(keccak256(signature.as_bytes()))
}

fn encode_with_selector(signature: &str, tokens: &[Token]) -> Bytes {
    let mut out = selector(signature).to_vec();
    out.extend(abi::encode(tokens));
    Bytes::from(out)
}

fn split_selector(data: &[u8]) -> Result<([u8; 4], &[u8]), AbiDecodeError> {
    if data.len() < 4 {
        return Err(AbiDecodeError::TooShort);
    }
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&data[..4]);
    Ok((sel, &data[4..]))
}

fn lookup<'a>(signatures: &[&'a str], sel: [u8; 4]) -> Result<&'a str, AbiDecodeError> {
    signatures
        .iter()
        .copied()
        .find(|s| selector(s) == sel)
        .ok_or_else(|| AbiDecodeError::UnknownSelector(hex::encode(sel)))
}

/// Sequential reader over decoded tokens.
struct TokenReader {
    tokens: std::vec::IntoIter<Token>,
}

impl TokenReader {
    fn new(tokens: Vec<Token>) -> Self {
        TokenReader {
            tokens: tokens.into_iter(),
        }
    }

    fn next(&mut self) -> Result<Token, AbiDecodeError> {
        self.tokens.next().ok_or(AbiDecodeError::MissingField)
    }

    fn uint(&mut self) -> Result<U256, AbiDecodeError> {
        self.next()?
            .into_uint()
            .ok_or(AbiDecodeError::TypeMismatch("uint"))
    }

    fn address(&mut self) -> Result<Address, AbiDecodeError> {
        self.next()?
            .into_address()
            .ok_or(AbiDecodeError::TypeMismatch("address"))
    }

    fn boolean(&mut self) -> Result<bool, AbiDecodeError> {
        self.next()?
            .into_bool()
            .ok_or(AbiDecodeError::TypeMismatch("bool"))
    }

    fn string(&mut self) -> Result<String, AbiDecodeError> {
        self.next()?
            .into_string()
            .ok_or(AbiDecodeError::TypeMismatch("string"))
    }

    fn array(&mut self) -> Result<Vec<Token>, AbiDecodeError> {
        self.next()?
            .into_array()
            .ok_or(AbiDecodeError::TypeMismatch("array"))
    }

    fn tuple(&mut self) -> Result<TokenReader, AbiDecodeError> {
        self.next()?
            .into_tuple()
            .map(TokenReader::new)
            .ok_or(AbiDecodeError::TypeMismatch("tuple"))
    }
}

fn address_list(tokens: Vec<Token>) -> Result<Vec<Address>, AbiDecodeError> {
    tokens
        .into_iter()
        .map(|t| t.into_address().ok_or(AbiDecodeError::TypeMismatch("address")))
        .collect()
}

fn rate(value: U256, field: &'static str) -> Result<BasisPointRate, AbiDecodeError> {
    if value > U256::from(BasisPointRate::MAX) {
        return Err(AbiDecodeError::OutOfRange(field));
    }
    BasisPointRate::new(value.as_u64()).map_err(|_| AbiDecodeError::OutOfRange(field))
}

fn timestamp(value: U256, field: &'static str) -> Result<EpochTimestamp, AbiDecodeError> {
    if value > U256::from(u64::MAX) {
        return Err(AbiDecodeError::OutOfRange(field));
    }
    Ok(EpochTimestamp::new(value.as_u64()))
}

// ============================================================================
// Registry calls
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    AssetImplementation,
    UsdcToken,
    GetCompanyValuation {
        company_id: U256,
    },
    GetAssetByCompany {
        company_id: U256,
    },
    GetAllAssets,
    GetPlatformStats,
    GetAssetsDetails {
        assets: Vec<Address>,
    },
    GetUserHoldings {
        assets: Vec<Address>,
        user: Address,
    },
    SubmitValuation {
        company_id: U256,
        valuation: U256,
        initial_price: U256,
        evaluator: Address,
    },
    CreateAsset {
        company_id: U256,
        name: String,
        symbol: String,
    },
}

impl RegistryCall {
    pub fn signature(&self) -> &'static str {
        match self {
            RegistryCall::AssetImplementation => sig::ASSET_IMPLEMENTATION,
            RegistryCall::UsdcToken => sig::USDC_TOKEN,
            RegistryCall::GetCompanyValuation { .. } => sig::GET_COMPANY_VALUATION,
            RegistryCall::GetAssetByCompany { .. } => sig::GET_ASSET_BY_COMPANY,
            RegistryCall::GetAllAssets => sig::GET_ALL_ASSETS,
            RegistryCall::GetPlatformStats => sig::GET_PLATFORM_STATS,
            RegistryCall::GetAssetsDetails { .. } => sig::GET_ASSETS_DETAILS,
            RegistryCall::GetUserHoldings { .. } => sig::GET_USER_HOLDINGS,
            RegistryCall::SubmitValuation { .. } => sig::SUBMIT_VALUATION,
            RegistryCall::CreateAsset { .. } => sig::CREATE_ASSET,
        }
    }

    fn tokens(&self) -> Vec<Token> {
        match self {
            RegistryCall::AssetImplementation
            | RegistryCall::UsdcToken
            | RegistryCall::GetAllAssets
            | RegistryCall::GetPlatformStats => vec![],
            RegistryCall::GetCompanyValuation { company_id }
            | RegistryCall::GetAssetByCompany { company_id } => vec![Token::Uint(*company_id)],
            RegistryCall::GetAssetsDetails { assets } => vec![Token::Array(
                assets.iter().map(|a| Token::Address(*a)).collect(),
            )],
            RegistryCall::GetUserHoldings { assets, user } => vec![
                Token::Array(assets.iter().map(|a| Token::Address(*a)).collect()),
                Token::Address(*user),
            ],
            RegistryCall::SubmitValuation {
                company_id,
                valuation,
                initial_price,
                evaluator,
            } => vec![
                Token::Uint(*company_id),
                Token::Uint(*valuation),
                Token::Uint(*initial_price),
                Token::Address(*evaluator),
            ],
            RegistryCall::CreateAsset {
                company_id,
                name,
                symbol,
            } => vec![
                Token::Uint(*company_id),
                Token::String(name.clone()),
                Token::String(symbol.clone()),
            ],
        }
    }

    pub fn encode(&self) -> Bytes {
        encode_with_selector(self.signature(), &self.tokens())
    }

    /// Decodes calldata back into a typed call.
    pub fn decode(data: &[u8]) -> Result<Self, AbiDecodeError> {
        let (sel, args) = split_selector(data)?;
        let signature = lookup(sig::REGISTRY, sel)?;
        let address_array = ParamType::Array(Box::new(ParamType::Address));
        let call = match signature {
            sig::ASSET_IMPLEMENTATION => RegistryCall::AssetImplementation,
            sig::USDC_TOKEN => RegistryCall::UsdcToken,
            sig::GET_ALL_ASSETS => RegistryCall::GetAllAssets,
            sig::GET_PLATFORM_STATS => RegistryCall::GetPlatformStats,
            sig::GET_COMPANY_VALUATION => {
                let mut r = TokenReader::new(abi::decode(&[ParamType::Uint(256)], args)?);
                RegistryCall::GetCompanyValuation {
                    company_id: r.uint()?,
                }
            }
            sig::GET_ASSET_BY_COMPANY => {
                let mut r = TokenReader::new(abi::decode(&[ParamType::Uint(256)], args)?);
                RegistryCall::GetAssetByCompany {
                    company_id: r.uint()?,
                }
            }
            sig::GET_ASSETS_DETAILS => {
                let mut r = TokenReader::new(abi::decode(&[address_array], args)?);
                RegistryCall::GetAssetsDetails {
                    assets: address_list(r.array()?)?,
                }
            }
            sig::GET_USER_HOLDINGS => {
                let mut r =
                    TokenReader::new(abi::decode(&[address_array, ParamType::Address], args)?);
                RegistryCall::GetUserHoldings {
                    assets: address_list(r.array()?)?,
                    user: r.address()?,
                }
            }
            sig::SUBMIT_VALUATION => {
                let mut r = TokenReader::new(abi::decode(
                    &[
                        ParamType::Uint(256),
                        ParamType::Uint(256),
                        ParamType::Uint(256),
                        ParamType::Address,
                    ],
                    args,
                )?);
                RegistryCall::SubmitValuation {
                    company_id: r.uint()?,
                    valuation: r.uint()?,
                    initial_price: r.uint()?,
                    evaluator: r.address()?,
                }
            }
            sig::CREATE_ASSET => {
                let mut r = TokenReader::new(abi::decode(
                    &[ParamType::Uint(256), ParamType::String, ParamType::String],
                    args,
                )?);
                RegistryCall::CreateAsset {
                    company_id: r.uint()?,
                    name: r.string()?,
                    symbol: r.string()?,
                }
            }
            other => return Err(AbiDecodeError::UnknownSelector(other.to_string())),
        };
        Ok(call)
    }
}

// ============================================================================
// Asset calls
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetCall {
    GetAssetDetails,
    GetTradingStatus,
    GetTradingStats,
    GetUserHolding { user: Address },
    UpdatePrice { price: U256 },
    UpdateFeeRates { buy_fee_rate: U256, sell_fee_rate: U256 },
    ActivateTrading,
    DeactivateTrading,
    Pause,
    Unpause,
    BuyTokens { usdc_amount: U256 },
    SellTokens { token_amount: U256 },
    WithdrawFees,
    CompanyWithdraw { amount: U256 },
}

impl AssetCall {
    pub fn signature(&self) -> &'static str {
        match self {
            AssetCall::GetAssetDetails => sig::GET_ASSET_DETAILS,
            AssetCall::GetTradingStatus => sig::GET_TRADING_STATUS,
            AssetCall::GetTradingStats => sig::GET_TRADING_STATS,
            AssetCall::GetUserHolding { .. } => sig::GET_USER_HOLDING,
            AssetCall::UpdatePrice { .. } => sig::UPDATE_PRICE,
            AssetCall::UpdateFeeRates { .. } => sig::UPDATE_FEE_RATES,
            AssetCall::ActivateTrading => sig::ACTIVATE_TRADING,
            AssetCall::DeactivateTrading => sig::DEACTIVATE_TRADING,
            AssetCall::Pause => sig::PAUSE,
            AssetCall::Unpause => sig::UNPAUSE,
            AssetCall::BuyTokens { .. } => sig::BUY_TOKENS,
            AssetCall::SellTokens { .. } => sig::SELL_TOKENS,
            AssetCall::WithdrawFees => sig::WITHDRAW_FEES,
            AssetCall::CompanyWithdraw { .. } => sig::COMPANY_WITHDRAW,
        }
    }

    fn tokens(&self) -> Vec<Token> {
        match self {
            AssetCall::GetUserHolding { user } => vec![Token::Address(*user)],
            AssetCall::UpdatePrice { price } => vec![Token::Uint(*price)],
            AssetCall::UpdateFeeRates {
                buy_fee_rate,
                sell_fee_rate,
            } => vec![Token::Uint(*buy_fee_rate), Token::Uint(*sell_fee_rate)],
            AssetCall::BuyTokens { usdc_amount } => vec![Token::Uint(*usdc_amount)],
            AssetCall::SellTokens { token_amount } => vec![Token::Uint(*token_amount)],
            AssetCall::CompanyWithdraw { amount } => vec![Token::Uint(*amount)],
            _ => vec![],
        }
    }

    pub fn encode(&self) -> Bytes {
        encode_with_selector(self.signature(), &self.tokens())
    }

    pub fn decode(data: &[u8]) -> Result<Self, AbiDecodeError> {
        let (sel, args) = split_selector(data)?;
        let signature = lookup(sig::ASSET, sel)?;
        let single_uint = |args: &[u8]| -> Result<U256, AbiDecodeError> {
            TokenReader::new(abi::decode(&[ParamType::Uint(256)], args)?).uint()
        };
        let call = match signature {
            sig::GET_ASSET_DETAILS => AssetCall::GetAssetDetails,
            sig::GET_TRADING_STATUS => AssetCall::GetTradingStatus,
            sig::GET_TRADING_STATS => AssetCall::GetTradingStats,
            sig::ACTIVATE_TRADING => AssetCall::ActivateTrading,
            sig::DEACTIVATE_TRADING => AssetCall::DeactivateTrading,
            sig::PAUSE => AssetCall::Pause,
            sig::UNPAUSE => AssetCall::Unpause,
            sig::WITHDRAW_FEES => AssetCall::WithdrawFees,
            sig::GET_USER_HOLDING => {
                let mut r = TokenReader::new(abi::decode(&[ParamType::Address], args)?);
                AssetCall::GetUserHolding { user: r.address()? }
            }
            sig::UPDATE_PRICE => AssetCall::UpdatePrice {
                price: single_uint(args)?,
            },
            sig::BUY_TOKENS => AssetCall::BuyTokens {
                usdc_amount: single_uint(args)?,
            },
            sig::SELL_TOKENS => AssetCall::SellTokens {
                token_amount: single_uint(args)?,
            },
            sig::COMPANY_WITHDRAW => AssetCall::CompanyWithdraw {
                amount: single_uint(args)?,
            },
            sig::UPDATE_FEE_RATES => {
                let mut r = TokenReader::new(abi::decode(
                    &[ParamType::Uint(256), ParamType::Uint(256)],
                    args,
                )?);
                AssetCall::UpdateFeeRates {
                    buy_fee_rate: r.uint()?,
                    sell_fee_rate: r.uint()?,
                }
            }
            other => return Err(AbiDecodeError::UnknownSelector(other.to_string())),
        };
        Ok(call)
    }
}

// ============================================================================
// Return data
// ============================================================================

fn asset_details_params() -> Vec<ParamType> {
    vec![
        ParamType::Address,   // asset
        ParamType::Uint(256), // companyId
        ParamType::String,    // name
        ParamType::String,    // symbol
        ParamType::Uint(256), // maxSupply
        ParamType::Uint(256), // currentSupply
        ParamType::Uint(256), // pricePerToken
        ParamType::Uint(256), // buyFeeRate
        ParamType::Uint(256), // sellFeeRate
        ParamType::Bool,      // tradingActive
        ParamType::Bool,      // paused
        ParamType::Uint(256), // lastPriceUpdate
        ParamType::Uint(256), // collectedFees
        ParamType::Uint(256), // totalVolume
        ParamType::Address,   // company
    ]
}

fn holding_params() -> Vec<ParamType> {
    vec![
        ParamType::Uint(256), // balance
        ParamType::Uint(256), // totalPurchaseValue
        ParamType::Uint(256), // totalSaleValue
        ParamType::Uint(256), // totalFeesPaid
        ParamType::Uint(256), // totalTokensPurchased
        ParamType::Uint(256), // totalTokensSold
        ParamType::Uint(256), // lastTradeAt
        ParamType::Bool,      // hasTraded
    ]
}

pub fn decode_address(data: &[u8]) -> Result<Address, AbiDecodeError> {
    TokenReader::new(abi::decode(&[ParamType::Address], data)?).address()
}

pub fn decode_address_list(data: &[u8]) -> Result<Vec<Address>, AbiDecodeError> {
    let tokens = abi::decode(&[ParamType::Array(Box::new(ParamType::Address))], data)?;
    address_list(TokenReader::new(tokens).array()?)
}

pub fn decode_company_valuation(
    data: &[u8],
    numeric: &NumericConfig,
) -> Result<CompanyValuation, AbiDecodeError> {
    let mut r = TokenReader::new(abi::decode(
        &[
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Address,
            ParamType::Uint(256),
            ParamType::Bool,
        ],
        data,
    )?);
    Ok(CompanyValuation {
        company_id: CompanyId::new(r.uint()?),
        valuation: numeric.currency(r.uint()?),
        initial_price: numeric.currency(r.uint()?),
        evaluator: r.address()?,
        assessed_at: timestamp(r.uint()?, "assessedAt")?,
        exists: r.boolean()?,
    })
}

pub fn decode_platform_stats(
    data: &[u8],
    numeric: &NumericConfig,
) -> Result<PlatformSnapshot, AbiDecodeError> {
    let mut r = TokenReader::new(abi::decode(&vec![ParamType::Uint(256); 6], data)?);
    Ok(PlatformSnapshot {
        total_assets: r.uint()?,
        total_active_assets: r.uint()?,
        total_market_cap: numeric.currency(r.uint()?),
        total_volume: numeric.currency(r.uint()?),
        total_tokens_in_circulation: numeric.shares(r.uint()?),
        total_fees_collected: numeric.currency(r.uint()?),
    })
}

fn read_asset_details(
    mut r: TokenReader,
    numeric: &NumericConfig,
) -> Result<AssetDetails, AbiDecodeError> {
    Ok(AssetDetails {
        asset: r.address()?,
        company_id: CompanyId::new(r.uint()?),
        name: r.string()?,
        symbol: r.string()?,
        max_supply: numeric.shares(r.uint()?),
        current_supply: numeric.shares(r.uint()?),
        price_per_token: numeric.currency(r.uint()?),
        buy_fee_rate: rate(r.uint()?, "buyFeeRate")?,
        sell_fee_rate: rate(r.uint()?, "sellFeeRate")?,
        trading_active: r.boolean()?,
        paused: r.boolean()?,
        last_price_update: timestamp(r.uint()?, "lastPriceUpdate")?,
        collected_fees: numeric.currency(r.uint()?),
        total_volume: numeric.currency(r.uint()?),
        company: r.address()?,
    })
}

pub fn decode_asset_details(
    data: &[u8],
    numeric: &NumericConfig,
) -> Result<AssetDetails, AbiDecodeError> {
    let tokens = abi::decode(&[ParamType::Tuple(asset_details_params())], data)?;
    read_asset_details(TokenReader::new(tokens).tuple()?, numeric)
}

pub fn decode_asset_details_list(
    data: &[u8],
    numeric: &NumericConfig,
) -> Result<Vec<AssetDetails>, AbiDecodeError> {
    let tokens = abi::decode(
        &[ParamType::Array(Box::new(ParamType::Tuple(
            asset_details_params(),
        )))],
        data,
    )?;
    TokenReader::new(tokens)
        .array()?
        .into_iter()
        .map(|t| {
            let fields = t.into_tuple().ok_or(AbiDecodeError::TypeMismatch("tuple"))?;
            read_asset_details(TokenReader::new(fields), numeric)
        })
        .collect()
}

pub fn decode_trading_status(data: &[u8]) -> Result<TradingStatus, AbiDecodeError> {
    let mut r = TokenReader::new(abi::decode(&vec![ParamType::Bool; 3], data)?);
    Ok(TradingStatus {
        trading_active: r.boolean()?,
        paused: r.boolean()?,
        valuation_set: r.boolean()?,
    })
}

pub fn decode_trading_stats(
    data: &[u8],
    numeric: &NumericConfig,
) -> Result<TradingStats, AbiDecodeError> {
    let mut r = TokenReader::new(abi::decode(&vec![ParamType::Uint(256); 4], data)?);
    Ok(TradingStats {
        total_trades: r.uint()?,
        total_volume: numeric.currency(r.uint()?),
        average_trade_size: numeric.currency(r.uint()?),
        price_volatility: r.uint()?,
    })
}

fn read_holding(
    mut r: TokenReader,
    asset: Address,
    user: Address,
    numeric: &NumericConfig,
) -> Result<UserHolding, AbiDecodeError> {
    Ok(UserHolding {
        asset,
        user,
        balance: numeric.shares(r.uint()?),
        total_purchase_value: numeric.currency(r.uint()?),
        total_sale_value: numeric.currency(r.uint()?),
        total_fees_paid: numeric.currency(r.uint()?),
        total_tokens_purchased: numeric.shares(r.uint()?),
        total_tokens_sold: numeric.shares(r.uint()?),
        last_trade_at: timestamp(r.uint()?, "lastTradeAt")?,
        has_traded: r.boolean()?,
    })
}

pub fn decode_user_holding(
    data: &[u8],
    asset: Address,
    user: Address,
    numeric: &NumericConfig,
) -> Result<UserHolding, AbiDecodeError> {
    let tokens = abi::decode(&[ParamType::Tuple(holding_params())], data)?;
    read_holding(TokenReader::new(tokens).tuple()?, asset, user, numeric)
}

/// Decodes `getUserHoldings` output; results are aligned with `assets`.
pub fn decode_user_holdings(
    data: &[u8],
    assets: &[Address],
    user: Address,
    numeric: &NumericConfig,
) -> Result<Vec<UserHolding>, AbiDecodeError> {
    let tokens = abi::decode(
        &[ParamType::Array(Box::new(ParamType::Tuple(holding_params())))],
        data,
    )?;
    let rows = TokenReader::new(tokens).array()?;
    if rows.len() != assets.len() {
        return Err(AbiDecodeError::MissingField);
    }
    rows.into_iter()
        .zip(assets.iter())
        .map(|(t, asset)| {
            let fields = t.into_tuple().ok_or(AbiDecodeError::TypeMismatch("tuple"))?;
            read_holding(TokenReader::new(fields), *asset, user, numeric)
        })
        .collect()
}

// ============================================================================
// Return data encoding (ledger side)
// ============================================================================

pub fn encode_address(address: Address) -> Bytes {
    Bytes::from(abi::encode(&[Token::Address(address)]))
}

pub fn encode_address_list(addresses: &[Address]) -> Bytes {
    Bytes::from(abi::encode(&[Token::Array(
        addresses.iter().map(|a| Token::Address(*a)).collect(),
    )]))
}

pub fn encode_company_valuation(v: &CompanyValuation) -> Bytes {
    Bytes::from(abi::encode(&[
        Token::Uint(v.company_id.as_u256()),
        Token::Uint(v.valuation.raw()),
        Token::Uint(v.initial_price.raw()),
        Token::Address(v.evaluator),
        Token::Uint(U256::from(v.assessed_at.as_u64())),
        Token::Bool(v.exists),
    ]))
}

pub fn encode_platform_stats(s: &PlatformSnapshot) -> Bytes {
    Bytes::from(abi::encode(&[
        Token::Uint(s.total_assets),
        Token::Uint(s.total_active_assets),
        Token::Uint(s.total_market_cap.raw()),
        Token::Uint(s.total_volume.raw()),
        Token::Uint(s.total_tokens_in_circulation.raw()),
        Token::Uint(s.total_fees_collected.raw()),
    ]))
}

fn asset_details_token(d: &AssetDetails) -> Token {
    Token::Tuple(vec![
        Token::Address(d.asset),
        Token::Uint(d.company_id.as_u256()),
        Token::String(d.name.clone()),
        Token::String(d.symbol.clone()),
        Token::Uint(d.max_supply.raw()),
        Token::Uint(d.current_supply.raw()),
        Token::Uint(d.price_per_token.raw()),
        Token::Uint(d.buy_fee_rate.as_u256()),
        Token::Uint(d.sell_fee_rate.as_u256()),
        Token::Bool(d.trading_active),
        Token::Bool(d.paused),
        Token::Uint(U256::from(d.last_price_update.as_u64())),
        Token::Uint(d.collected_fees.raw()),
        Token::Uint(d.total_volume.raw()),
        Token::Address(d.company),
    ])
}

pub fn encode_asset_details(d: &AssetDetails) -> Bytes {
    Bytes::from(abi::encode(&[asset_details_token(d)]))
}

pub fn encode_asset_details_list(list: &[AssetDetails]) -> Bytes {
    Bytes::from(abi::encode(&[Token::Array(
        list.iter().map(asset_details_token).collect(),
    )]))
}

pub fn encode_trading_status(s: &TradingStatus) -> Bytes {
    Bytes::from(abi::encode(&[
        Token::Bool(s.trading_active),
        Token::Bool(s.paused),
        Token::Bool(s.valuation_set),
    ]))
}

pub fn encode_trading_stats(s: &TradingStats) -> Bytes {
    Bytes::from(abi::encode(&[
        Token::Uint(s.total_trades),
        Token::Uint(s.total_volume.raw()),
        Token::Uint(s.average_trade_size.raw()),
        Token::Uint(s.price_volatility),
    ]))
}

fn holding_token(h: &UserHolding) -> Token {
    Token::Tuple(vec![
        Token::Uint(h.balance.raw()),
        Token::Uint(h.total_purchase_value.raw()),
        Token::Uint(h.total_sale_value.raw()),
        Token::Uint(h.total_fees_paid.raw()),
        Token::Uint(h.total_tokens_purchased.raw()),
        Token::Uint(h.total_tokens_sold.raw()),
        Token::Uint(U256::from(h.last_trade_at.as_u64())),
        Token::Bool(h.has_traded),
    ])
}

pub fn encode_user_holding(h: &UserHolding) -> Bytes {
    Bytes::from(abi::encode(&[holding_token(h)]))
}

pub fn encode_user_holdings(list: &[UserHolding]) -> Bytes {
    Bytes::from(abi::encode(&[Token::Array(
        list.iter().map(holding_token).collect(),
    )]))
}

// ============================================================================
// Events
// ============================================================================

fn u256_topic(value: U256) -> H256 {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    H256::from(buf)
}

fn address_topic(address: Address) -> H256 {
    let mut buf = [0u8; 32];
    buf[12..].copy_from_slice(address.as_bytes());
    H256::from(buf)
}

pub fn decode_asset_created(log: &LogRecord) -> Result<AssetCreatedEvent, AbiDecodeError> {
    if log.topics.first() != Some(&event_topic(sig::ASSET_CREATED_EVENT)) || log.topics.len() < 3 {
        return Err(AbiDecodeError::WrongEvent);
    }
    let company_id = U256::from_big_endian(log.topics[1].as_bytes());
    let asset = Address::from_slice(&log.topics[2].as_bytes()[12..]);
    let mut r = TokenReader::new(abi::decode(
        &[ParamType::String, ParamType::String, ParamType::Uint(256)],
        &log.data,
    )?);
    Ok(AssetCreatedEvent {
        company_id: CompanyId::new(company_id),
        asset,
        name: r.string()?,
        symbol: r.string()?,
        max_supply: r.uint()?,
    })
}

/// Finds the `AssetCreated` log emitted by `registry`, if any.
pub fn find_asset_created(
    logs: &[LogRecord],
    registry: Address,
) -> Option<Result<AssetCreatedEvent, AbiDecodeError>> {
    let topic = event_topic(sig::ASSET_CREATED_EVENT);
    logs.iter()
        .find(|l| l.address == registry && l.topics.first() == Some(&topic))
        .map(decode_asset_created)
}

pub fn encode_asset_created(registry: Address, event: &AssetCreatedEvent) -> LogRecord {
    LogRecord {
        address: registry,
        topics: vec![
            event_topic(sig::ASSET_CREATED_EVENT),
            u256_topic(event.company_id.as_u256()),
            address_topic(event.asset),
        ],
        data: Bytes::from(abi::encode(&[
            Token::String(event.name.clone()),
            Token::String(event.symbol.clone()),
            Token::Uint(event.max_supply),
        ])),
    }
}

pub fn encode_valuation_submitted(registry: Address, v: &CompanyValuation) -> LogRecord {
    LogRecord {
        address: registry,
        topics: vec![
            event_topic(sig::VALUATION_SUBMITTED_EVENT),
            u256_topic(v.company_id.as_u256()),
            address_topic(v.evaluator),
        ],
        data: Bytes::from(abi::encode(&[
            Token::Uint(v.valuation.raw()),
            Token::Uint(v.initial_price.raw()),
        ])),
    }
}
