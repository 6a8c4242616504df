use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// GST split of a tax-inclusive total.
///
/// Totals entered at intake already include GST, so the subtotal is backed
/// out of the total rather than the tax added on top:
/// `subtotal = total / (1 + rate/100)`, `gst = total - subtotal`. CGST and
/// SGST are each half of the GST amount.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GstBreakdown {
    pub total_amount: Decimal,
    pub subtotal: Decimal,
    pub gst_amount: Decimal,
    pub cgst_amount: Decimal,
    pub sgst_amount: Decimal,
    pub rate: Decimal,
}

impl GstBreakdown {
    pub fn inclusive(total_amount: Decimal, rate: Decimal) -> Self {
        let divisor = Decimal::ONE + rate / Decimal::from(100);
        let subtotal = (total_amount / divisor).round_dp(2);
        let gst_amount = total_amount - subtotal;
        let half = (gst_amount / Decimal::from(2)).round_dp(2);

        Self {
            total_amount,
            subtotal,
            gst_amount,
            cgst_amount: half,
            sgst_amount: gst_amount - half,
            rate,
        }
    }
}
