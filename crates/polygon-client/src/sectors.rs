//! SIC description to SPDR sector ETF mapping.

/// Benchmark every sector ETF is compared against.
pub const BENCHMARK_ETF: &str = "SPY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorEtf {
    pub symbol: &'static str,
    pub sector: &'static str,
}

pub const STANDARD_SECTORS: &[SectorEtf] = &[
    SectorEtf { symbol: "XLK", sector: "Technology" },
    SectorEtf { symbol: "XLF", sector: "Financials" },
    SectorEtf { symbol: "XLV", sector: "Healthcare" },
    SectorEtf { symbol: "XLE", sector: "Energy" },
    SectorEtf { symbol: "XLY", sector: "Consumer Discretionary" },
    SectorEtf { symbol: "XLP", sector: "Consumer Staples" },
    SectorEtf { symbol: "XLI", sector: "Industrials" },
    SectorEtf { symbol: "XLB", sector: "Materials" },
    SectorEtf { symbol: "XLU", sector: "Utilities" },
    SectorEtf { symbol: "XLRE", sector: "Real Estate" },
    SectorEtf { symbol: "XLC", sector: "Communication Services" },
];

// Checked in order; the first keyword found wins.
const KEYWORDS: &[(&str, &str)] = &[
    ("REAL ESTATE", "XLRE"),
    ("REIT", "XLRE"),
    ("BANK", "XLF"),
    ("INSURANCE", "XLF"),
    ("FINANCE", "XLF"),
    ("SECURITY BROKERS", "XLF"),
    ("INVESTMENT", "XLF"),
    ("PHARMACEUTICAL", "XLV"),
    ("BIOLOGICAL", "XLV"),
    ("MEDICAL", "XLV"),
    ("SURGICAL", "XLV"),
    ("HEALTH", "XLV"),
    ("HOSPITAL", "XLV"),
    ("PETROLEUM", "XLE"),
    ("CRUDE", "XLE"),
    ("OIL", "XLE"),
    ("NATURAL GAS", "XLE"),
    ("ELECTRIC SERVICES", "XLU"),
    ("GAS DISTRIBUTION", "XLU"),
    ("WATER SUPPLY", "XLU"),
    ("TELEPHONE", "XLC"),
    ("TELEVISION", "XLC"),
    ("COMMUNICATIONS", "XLC"),
    ("MOTION PICTURE", "XLC"),
    ("CABLE", "XLC"),
    ("COMPUTER", "XLK"),
    ("SOFTWARE", "XLK"),
    ("PREPACKAGED", "XLK"),
    ("SEMICONDUCTOR", "XLK"),
    ("ELECTRONIC", "XLK"),
    ("DATA PROCESSING", "XLK"),
    ("FOOD", "XLP"),
    ("BEVERAGE", "XLP"),
    ("BOTTLED", "XLP"),
    ("TOBACCO", "XLP"),
    ("CIGARETTES", "XLP"),
    ("SOAP", "XLP"),
    ("PERFUMES", "XLP"),
    ("GROCERY", "XLP"),
    ("VARIETY STORES", "XLP"),
    ("RETAIL", "XLY"),
    ("MOTOR VEHICLE", "XLY"),
    ("AUTO", "XLY"),
    ("HOTELS", "XLY"),
    ("EATING", "XLY"),
    ("APPAREL", "XLY"),
    ("RUBBER", "XLY"),
    ("CHEMICAL", "XLB"),
    ("STEEL", "XLB"),
    ("METAL", "XLB"),
    ("MINING", "XLB"),
    ("PAPER", "XLB"),
    ("GOLD", "XLB"),
    ("AIRCRAFT", "XLI"),
    ("MACHINERY", "XLI"),
    ("CONSTRUCTION", "XLI"),
    ("TRANSPORTATION", "XLI"),
    ("RAILROAD", "XLI"),
    ("TRUCKING", "XLI"),
    ("AIR COURIER", "XLI"),
    ("ENGINEERING", "XLI"),
];

pub fn etf_by_symbol(symbol: &str) -> Option<SectorEtf> {
    STANDARD_SECTORS.iter().copied().find(|s| s.symbol == symbol)
}

/// Sector ETF for a Polygon SIC description, `None` when nothing matches.
pub fn classify_sic(description: &str) -> Option<SectorEtf> {
    let upper = description.to_ascii_uppercase();
    KEYWORDS
        .iter()
        .find(|(keyword, _)| upper.contains(keyword))
        .and_then(|(_, etf)| etf_by_symbol(etf))
}
