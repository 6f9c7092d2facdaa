//! Source-label-to-canonical-id lookups. SBV's own pages never agree on
//! exact wording between tables, so these match on substrings rather
//! than exact strings.

/// Interbank term labels to canonical indicator ids.
pub fn interbank_term_id(term: &str) -> Option<&'static str> {
    let t = term.to_lowercase();
    if t.contains("qua đêm") {
        Some("interbank_overnight")
    } else if t.contains("1 tuần") {
        Some("interbank_1w")
    } else if t.contains("2 tuần") {
        Some("interbank_2w")
    } else if t.contains("1 tháng") {
        Some("interbank_1m")
    } else if t.contains("3 tháng") {
        Some("interbank_3m")
    } else if t.contains("6 tháng") {
        Some("interbank_6m")
    } else if t.contains("9 tháng") {
        Some("interbank_9m")
    } else if t.contains("12 tháng") {
        Some("interbank_12m")
    } else {
        None
    }
}

/// Policy rate labels to canonical indicator ids.
pub fn policy_rate_id(rate_type: &str) -> Option<&'static str> {
    let t = rate_type.to_lowercase();
    if t.contains("tái cấp vốn") {
        Some("policy_refinancing_rate")
    } else if t.contains("tái chiết khấu") {
        Some("policy_rediscount_rate")
    } else if t.contains("cho vay qua đêm") {
        Some("policy_overnight_lending_rate")
    } else if t.contains("trần lãi suất") && t.contains("ngắn hạn") {
        Some("policy_short_term_lending_ceiling")
    } else if t.contains("trần lãi suất") {
        Some("policy_deposit_rate_ceiling")
    } else {
        None
    }
}

/// Gold type labels to canonical indicator ids. Only SJC-branded bars
/// are tracked; jewelry gold and other brands are not comparable
/// time-series.
pub fn gold_price_id(gold_type: &str) -> Option<&'static str> {
    let t = gold_type.to_lowercase();
    if t.contains("sjc") {
        Some("gold_sjc")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interbank_terms_resolve() {
        assert_eq!(interbank_term_id("Qua đêm"), Some("interbank_overnight"));
        assert_eq!(interbank_term_id("1 tháng"), Some("interbank_1m"));
        assert_eq!(interbank_term_id("unknown term"), None);
    }

    #[test]
    fn policy_rates_resolve() {
        assert_eq!(policy_rate_id("Lãi suất tái cấp vốn"), Some("policy_refinancing_rate"));
        assert_eq!(policy_rate_id("Lãi suất tái chiết khấu"), Some("policy_rediscount_rate"));
        assert_eq!(
            policy_rate_id("Lãi suất cho vay qua đêm trong thanh toán điện tử liên ngân hàng"),
            Some("policy_overnight_lending_rate")
        );
    }

    #[test]
    fn gold_price_requires_sjc_brand() {
        assert_eq!(gold_price_id("Vàng SJC"), Some("gold_sjc"));
        assert_eq!(gold_price_id("Vàng nhẫn 9999"), None);
    }
}
