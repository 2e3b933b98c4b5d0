//! Process-wide fee configuration, immutable after the engine is built.

use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct FeeConfig {
    pub maker_rate: Decimal,
    pub taker_rate: Decimal,
    pub fee_currency: String,
}

impl FeeConfig {
    pub fn new(maker_rate: Decimal, taker_rate: Decimal, fee_currency: impl Into<String>) -> Self {
        Self {
            maker_rate,
            taker_rate,
            fee_currency: fee_currency.into(),
        }
    }

    /// `quantity × price × rate`, per spec.md §3/§4.2.
    pub fn maker_fee(&self, quantity: Decimal, price: Decimal) -> Decimal {
        quantity * price * self.maker_rate
    }

    pub fn taker_fee(&self, quantity: Decimal, price: Decimal) -> Decimal {
        quantity * price * self.taker_rate
    }
}

impl Default for FeeConfig {
    /// 0.1% maker / 0.2% taker in USDT, matching the original engine's defaults.
    fn default() -> Self {
        Self {
            maker_rate: Decimal::new(1, 3),  // 0.001
            taker_rate: Decimal::new(2, 3),  // 0.002
            fee_currency: "USDT".to_string(),
        }
    }
}
