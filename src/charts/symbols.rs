//! Ticker lookup from free-form topics such as "Apple Inc stock".

use once_cell::sync::OnceCell;
use regex::Regex;

fn ticker_re() -> Option<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_try_init(|| Regex::new(r"\b([A-Z]{1,5})(?:\.([A-Z]{2}))?\b")).ok()
}

/// Upper-case words that look like tickers but never are in a topic line.
const NOT_TICKERS: &[&str] = &["A", "I", "AI", "CEO", "CFO", "ETF", "GDP", "IPO", "US", "USA", "EU", "Q"];

pub const COMPANY_SYMBOLS: &[(&str, &str)] = &[
    ("apple", "AAPL.US"),
    ("microsoft", "MSFT.US"),
    ("google", "GOOG.US"),
    ("alphabet", "GOOG.US"),
    ("amazon", "AMZN.US"),
    ("meta", "META.US"),
    ("facebook", "META.US"),
    ("nvidia", "NVDA.US"),
    ("tesla", "TSLA.US"),
    ("netflix", "NFLX.US"),
    ("jpmorgan", "JPM.US"),
    ("jp morgan", "JPM.US"),
    ("goldman sachs", "GS.US"),
    ("goldman", "GS.US"),
    ("bank of america", "BAC.US"),
    ("wells fargo", "WFC.US"),
    ("visa", "V.US"),
    ("mastercard", "MA.US"),
    ("paypal", "PYPL.US"),
    ("berkshire", "BRK-A.US"),
    ("berkshire hathaway", "BRK-A.US"),
    ("johnson & johnson", "JNJ.US"),
    ("johnson and johnson", "JNJ.US"),
    ("pfizer", "PFE.US"),
    ("unitedhealth", "UNH.US"),
    ("abbvie", "ABBV.US"),
    ("merck", "MRK.US"),
    ("eli lilly", "LLY.US"),
    ("lilly", "LLY.US"),
    ("walmart", "WMT.US"),
    ("costco", "COST.US"),
    ("coca-cola", "KO.US"),
    ("coca cola", "KO.US"),
    ("coke", "KO.US"),
    ("pepsi", "PEP.US"),
    ("pepsico", "PEP.US"),
    ("nike", "NKE.US"),
    ("starbucks", "SBUX.US"),
    ("mcdonalds", "MCD.US"),
    ("mcdonald's", "MCD.US"),
    ("disney", "DIS.US"),
    ("walt disney", "DIS.US"),
    ("exxon", "XOM.US"),
    ("exxonmobil", "XOM.US"),
    ("chevron", "CVX.US"),
    ("boeing", "BA.US"),
    ("caterpillar", "CAT.US"),
    ("3m", "MMM.US"),
    ("general electric", "GE.US"),
    ("ge", "GE.US"),
    ("honeywell", "HON.US"),
    ("amd", "AMD.US"),
    ("intel", "INTC.US"),
    ("qualcomm", "QCOM.US"),
    ("broadcom", "AVGO.US"),
    ("tsmc", "TSM.US"),
    ("taiwan semiconductor", "TSM.US"),
    ("at&t", "T.US"),
    ("verizon", "VZ.US"),
    ("t-mobile", "TMUS.US"),
    ("salesforce", "CRM.US"),
    ("adobe", "ADBE.US"),
    ("oracle", "ORCL.US"),
    ("ibm", "IBM.US"),
    ("cisco", "CSCO.US"),
    ("uber", "UBER.US"),
    ("airbnb", "ABNB.US"),
    ("spotify", "SPOT.US"),
    ("zoom", "ZM.US"),
    ("shopify", "SHOP.US"),
    ("square", "SQ.US"),
    ("block", "SQ.US"),
    ("palantir", "PLTR.US"),
    ("snowflake", "SNOW.US"),
    ("crowdstrike", "CRWD.US"),
    ("coinbase", "COIN.US"),
];

/// Display names for the symbols the CDN is known to carry.
pub const SUPPORTED_STOCKS: &[(&str, &str)] = &[
    ("AAPL.US", "Apple"),
    ("MSFT.US", "Microsoft"),
    ("GOOGL.US", "Google (Alphabet)"),
    ("AMZN.US", "Amazon"),
    ("META.US", "Meta (Facebook)"),
    ("NVDA.US", "Nvidia"),
    ("TSLA.US", "Tesla"),
    ("NFLX.US", "Netflix"),
    ("JPM.US", "JPMorgan Chase"),
    ("GS.US", "Goldman Sachs"),
    ("BAC.US", "Bank of America"),
    ("WFC.US", "Wells Fargo"),
    ("V.US", "Visa"),
    ("MA.US", "Mastercard"),
    ("PYPL.US", "PayPal"),
    ("BRK-B.US", "Berkshire Hathaway"),
    ("JNJ.US", "Johnson & Johnson"),
    ("PFE.US", "Pfizer"),
    ("UNH.US", "UnitedHealth"),
    ("ABBV.US", "AbbVie"),
    ("MRK.US", "Merck"),
    ("LLY.US", "Eli Lilly"),
    ("WMT.US", "Walmart"),
    ("COST.US", "Costco"),
    ("KO.US", "Coca-Cola"),
    ("PEP.US", "PepsiCo"),
    ("NKE.US", "Nike"),
    ("SBUX.US", "Starbucks"),
    ("MCD.US", "McDonald's"),
    ("DIS.US", "Disney"),
    ("XOM.US", "ExxonMobil"),
    ("CVX.US", "Chevron"),
    ("BA.US", "Boeing"),
    ("CAT.US", "Caterpillar"),
    ("GE.US", "General Electric"),
    ("HON.US", "Honeywell"),
    ("AMD.US", "AMD"),
    ("INTC.US", "Intel"),
    ("QCOM.US", "Qualcomm"),
    ("AVGO.US", "Broadcom"),
    ("TSM.US", "TSMC"),
    ("T.US", "AT&T"),
    ("VZ.US", "Verizon"),
    ("TMUS.US", "T-Mobile"),
    ("CRM.US", "Salesforce"),
    ("ADBE.US", "Adobe"),
    ("ORCL.US", "Oracle"),
    ("IBM.US", "IBM"),
    ("CSCO.US", "Cisco"),
    ("UBER.US", "Uber"),
    ("ABNB.US", "Airbnb"),
    ("SPOT.US", "Spotify"),
    ("ZM.US", "Zoom"),
    ("SHOP.US", "Shopify"),
    ("SQ.US", "Block (Square)"),
    ("PLTR.US", "Palantir"),
    ("SNOW.US", "Snowflake"),
    ("CRWD.US", "CrowdStrike"),
    ("COIN.US", "Coinbase"),
];

fn contains_word(haystack: &str, needle: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric();
    haystack.match_indices(needle).any(|(at, _)| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + needle.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

/// `AAPL.US`-style symbol named in `topic`: an explicit ticker first, then a
/// known company name (longest name wins).
pub fn extract_symbol(topic: &str) -> Option<String> {
    for caps in ticker_re().into_iter().flat_map(|re| re.captures_iter(topic)) {
        let ticker = &caps[1];
        if NOT_TICKERS.contains(&ticker) {
            continue;
        }
        let suffix = caps.get(2).map_or("US", |m| m.as_str());
        return Some(format!("{}.{}", ticker, suffix));
    }

    let lower = topic.to_lowercase();
    let mut names: Vec<&(&str, &str)> = COMPANY_SYMBOLS.iter().collect();
    names.sort_by_key(|(name, _)| std::cmp::Reverse(name.len()));
    names
        .into_iter()
        .find(|(name, _)| contains_word(&lower, name))
        .map(|(_, symbol)| symbol.to_string())
}

/// Human name for a symbol; the bare ticker when unknown.
pub fn company_name(symbol: &str) -> String {
    let upper = symbol.to_uppercase();
    if let Some((_, name)) = SUPPORTED_STOCKS.iter().find(|(s, _)| *s == upper) {
        return name.to_string();
    }
    upper.split('.').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_tickers() {
        assert_eq!(extract_symbol("AAPL stock price").as_deref(), Some("AAPL.US"));
        assert_eq!(extract_symbol("TSLA.US performance").as_deref(), Some("TSLA.US"));
        assert_eq!(extract_symbol("Is SAP.DE undervalued").as_deref(), Some("SAP.DE"));
    }

    #[test]
    fn company_names() {
        assert_eq!(extract_symbol("Apple Inc stock").as_deref(), Some("AAPL.US"));
        assert_eq!(extract_symbol("What is happening with Amazon?").as_deref(), Some("AMZN.US"));
        assert_eq!(extract_symbol("Why Bank of America rallied").as_deref(), Some("BAC.US"));
        assert_eq!(extract_symbol("the general electric turnaround").as_deref(), Some("GE.US"));
    }

    #[test]
    fn acronyms_and_substrings_are_not_matches() {
        assert_eq!(extract_symbol("Random topic without stocks"), None);
        assert_eq!(extract_symbol("How AI will change energy"), None);
        assert_eq!(extract_symbol("I think a metaverse crash is coming"), None);
    }

    #[test]
    fn display_names() {
        assert_eq!(company_name("nvda.us"), "Nvidia");
        assert_eq!(company_name("XYZ.US"), "XYZ");
    }
}
