use crate::ledger::Wei;

/// Decimal places of one ether expressed in wei.
pub const ETHER_DECIMALS: u32 = 18;

/// Format a wei amount as ether with trailing zeros trimmed, e.g. `10^16` becomes `"0.01"`.
pub fn format_wei_as_ether(amount: Wei) -> String {
    let unit = 10u128.pow(ETHER_DECIMALS);
    let whole = amount / unit;
    let fraction = amount % unit;
    if fraction == 0 {
        return whole.to_string();
    }

    let digits = format!("{:0width$}", fraction, width = ETHER_DECIMALS as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_whole_and_fractional_amounts() {
        assert_eq!(format_wei_as_ether(0), "0");
        assert_eq!(format_wei_as_ether(2_000_000_000_000_000_000), "2");
        assert_eq!(format_wei_as_ether(10_000_000_000_000_000), "0.01");
        assert_eq!(format_wei_as_ether(1_500_000_000_000_000_001), "1.500000000000000001");
    }
}
