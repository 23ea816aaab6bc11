// 7.2: price-feed swap module. fills at the cross rate of the venue's prices minus a fee,
// out of the module's own inventory. a venue with its own quote book can be cross-checked
// against the independent feed in the context; too large a gap fails the quote.

use rust_decimal::Decimal;
use tracing::debug;

use super::{ModuleKind, QuoteContext, RouterError, SwapModule, SwapRequest, ModuleContext};
use crate::ledger::TokenLedger;
use crate::price_feed::{cross_rate, deviation, PriceBoard, PriceFeedError};
use crate::types::{round_down, round_up, Address, AssetId, Bps};

#[derive(Debug, Clone)]
pub enum Venue {
    /// Quotes straight from the context's price feed.
    Oracle,
    /// Quotes from the venue's own book (a DEX quoter, for instance).
    Book(PriceBoard),
}

#[derive(Debug, Clone)]
pub struct OracleSwapModule {
    name: String,
    address: Address,
    fee: Bps,
    venue: Venue,
    max_deviation: Option<Decimal>,
}

impl OracleSwapModule {
    pub fn new(name: &str, address: Address, fee: Bps) -> Self {
        Self {
            name: name.to_string(),
            address,
            fee,
            venue: Venue::Oracle,
            max_deviation: None,
        }
    }

    pub fn with_venue(mut self, venue: Venue) -> Self {
        self.venue = venue;
        self
    }

    /// Rejects quotes whose venue rate strays more than `max` (a fraction) from the feed.
    pub fn with_cross_check(mut self, max: Decimal) -> Self {
        self.max_deviation = Some(max);
        self
    }

    pub fn fee(&self) -> Bps {
        self.fee
    }

    // units of asset_out per unit of asset_in after the fee
    fn effective_rate(&self, ctx: &QuoteContext<'_>, asset_in: AssetId, asset_out: AssetId) -> Result<Decimal, RouterError> {
        let rate = match &self.venue {
            Venue::Oracle => cross_rate(ctx.prices, asset_in, asset_out, ctx.now)?,
            Venue::Book(book) => {
                let venue_rate = cross_rate(book, asset_in, asset_out, ctx.now)?;
                if let Some(max_deviation) = self.max_deviation {
                    let reference = cross_rate(ctx.prices, asset_in, asset_out, ctx.now)?;
                    let observed = deviation(venue_rate, reference);
                    if observed > max_deviation {
                        return Err(PriceFeedError::ExcessiveDeviation {
                            deviation: observed,
                            max_deviation,
                        }
                        .into());
                    }
                }
                venue_rate
            }
        };
        Ok(rate * (Decimal::ONE - self.fee.as_fraction()))
    }

    fn decimals(ledger: &TokenLedger, asset: AssetId) -> Result<u32, RouterError> {
        Ok(ledger.decimals(asset)?)
    }
}

impl SwapModule for OracleSwapModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Swap
    }

    fn address(&self) -> Address {
        self.address
    }

    fn quote_exact_in(&self, ctx: &QuoteContext<'_>, asset_in: AssetId, asset_out: AssetId, amount_in: Decimal) -> Result<Decimal, RouterError> {
        let rate = self.effective_rate(ctx, asset_in, asset_out)?;
        let decimals = Self::decimals(ctx.ledger, asset_out)?;
        Ok(round_down(amount_in * rate, decimals))
    }

    fn quote_exact_out(&self, ctx: &QuoteContext<'_>, asset_in: AssetId, asset_out: AssetId, amount_out: Decimal) -> Result<Decimal, RouterError> {
        let rate = self.effective_rate(ctx, asset_in, asset_out)?;
        if rate <= Decimal::ZERO {
            return Err(PriceFeedError::NoPriceAvailable { asset: asset_out }.into());
        }
        let decimals = Self::decimals(ctx.ledger, asset_in)?;
        Ok(round_up(amount_out / rate, decimals))
    }

    fn swap_exact_in(&self, ctx: &mut ModuleContext<'_>, request: SwapRequest) -> Result<Decimal, RouterError> {
        request.validate()?;
        let amount_out = self.quote_exact_in(&ctx.view(), request.asset_in, request.asset_out, request.amount)?;
        if amount_out < request.limit {
            return Err(RouterError::Slippage {
                amount_out,
                min_out: request.limit,
            });
        }

        ctx.ledger
            .transfer_from(self.address, request.payer, self.address, request.asset_in, request.amount)?;
        ctx.ledger
            .transfer(self.address, request.recipient, request.asset_out, amount_out)?;

        debug!(module = %self.name, asset_in = request.asset_in.0, asset_out = request.asset_out.0, amount_in = %request.amount, %amount_out, "swap exact in");
        Ok(amount_out)
    }

    fn swap_exact_out(&self, ctx: &mut ModuleContext<'_>, request: SwapRequest) -> Result<Decimal, RouterError> {
        request.validate()?;
        let amount_in = self.quote_exact_out(&ctx.view(), request.asset_in, request.asset_out, request.amount)?;
        if amount_in > request.limit {
            return Err(RouterError::ExcessiveInput {
                amount_in,
                max_in: request.limit,
            });
        }

        ctx.ledger
            .transfer_from(self.address, request.payer, self.address, request.asset_in, amount_in)?;
        ctx.ledger
            .transfer(self.address, request.recipient, request.asset_out, request.amount)?;

        debug!(module = %self.name, asset_in = request.asset_in.0, asset_out = request.asset_out.0, %amount_in, amount_out = %request.amount, "swap exact out");
        Ok(amount_in)
    }
}
