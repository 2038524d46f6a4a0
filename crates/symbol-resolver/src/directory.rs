use analysis_core::Symbol;

/// A listing known without any network lookup.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryEntry {
    pub ticker: &'static str,
    pub name: &'static str,
    pub exchange: &'static str,
    pub aliases: &'static [&'static str],
}

impl DirectoryEntry {
    pub fn to_symbol(&self) -> Symbol {
        Symbol::new(self.ticker, self.name).with_exchange(self.exchange)
    }
}

macro_rules! listing {
    ($ticker:expr, $name:expr, $exchange:expr) => {
        DirectoryEntry {
            ticker: $ticker,
            name: $name,
            exchange: $exchange,
            aliases: &[],
        }
    };
    ($ticker:expr, $name:expr, $exchange:expr, [$($alias:expr),+]) => {
        DirectoryEntry {
            ticker: $ticker,
            name: $name,
            exchange: $exchange,
            aliases: &[$($alias),+],
        }
    };
}

/// Large-cap listings on NSE and the major US exchanges.
pub const BUILTIN_DIRECTORY: &[DirectoryEntry] = &[
    // NSE
    listing!("RELIANCE.NS", "Reliance Industries Limited", "NSE", ["RIL"]),
    listing!("TCS.NS", "Tata Consultancy Services Limited", "NSE", ["TCS"]),
    listing!("HDFCBANK.NS", "HDFC Bank Limited", "NSE"),
    listing!("HDFCLIFE.NS", "HDFC Life Insurance Company Limited", "NSE"),
    listing!("ICICIBANK.NS", "ICICI Bank Limited", "NSE"),
    listing!("INFY.NS", "Infosys Limited", "NSE"),
    listing!("SBIN.NS", "State Bank of India", "NSE", ["SBI"]),
    listing!("BHARTIARTL.NS", "Bharti Airtel Limited", "NSE", ["Airtel"]),
    listing!("ITC.NS", "ITC Limited", "NSE"),
    listing!("LT.NS", "Larsen & Toubro Limited", "NSE", ["L&T"]),
    listing!("HINDUNILVR.NS", "Hindustan Unilever Limited", "NSE", ["HUL"]),
    listing!("KOTAKBANK.NS", "Kotak Mahindra Bank Limited", "NSE", ["Kotak Bank"]),
    listing!("AXISBANK.NS", "Axis Bank Limited", "NSE"),
    listing!("BAJFINANCE.NS", "Bajaj Finance Limited", "NSE"),
    listing!("MARUTI.NS", "Maruti Suzuki India Limited", "NSE", ["Maruti Suzuki"]),
    listing!("TATAMOTORS.NS", "Tata Motors Limited", "NSE"),
    listing!("TATASTEEL.NS", "Tata Steel Limited", "NSE"),
    listing!("WIPRO.NS", "Wipro Limited", "NSE"),
    listing!("SUNPHARMA.NS", "Sun Pharmaceutical Industries Limited", "NSE", ["Sun Pharma"]),
    listing!("ASIANPAINT.NS", "Asian Paints Limited", "NSE"),
    // Technology
    listing!("AAPL", "Apple Inc.", "XNAS"),
    listing!("MSFT", "Microsoft Corporation", "XNAS"),
    listing!("GOOGL", "Alphabet Inc. Class A", "XNAS", ["Google", "Alphabet"]),
    listing!("NVDA", "NVIDIA Corporation", "XNAS"),
    listing!("META", "Meta Platforms, Inc.", "XNAS", ["Facebook"]),
    listing!("AVGO", "Broadcom Inc.", "XNAS"),
    listing!("ORCL", "Oracle Corporation", "XNYS"),
    listing!("CRM", "Salesforce, Inc.", "XNYS"),
    listing!("AMD", "Advanced Micro Devices, Inc.", "XNAS"),
    listing!("ADBE", "Adobe Inc.", "XNAS"),
    listing!("INTC", "Intel Corporation", "XNAS"),
    listing!("CSCO", "Cisco Systems, Inc.", "XNAS"),
    listing!("IBM", "International Business Machines Corporation", "XNYS"),
    // Healthcare
    listing!("JNJ", "Johnson & Johnson", "XNYS"),
    listing!("UNH", "UnitedHealth Group Incorporated", "XNYS"),
    listing!("PFE", "Pfizer Inc.", "XNYS"),
    listing!("LLY", "Eli Lilly and Company", "XNYS"),
    listing!("MRK", "Merck & Co., Inc.", "XNYS"),
    // Financials
    listing!("JPM", "JPMorgan Chase & Co.", "XNYS", ["JP Morgan"]),
    listing!("BAC", "Bank of America Corporation", "XNYS"),
    listing!("GS", "The Goldman Sachs Group, Inc.", "XNYS", ["Goldman Sachs"]),
    listing!("V", "Visa Inc.", "XNYS"),
    listing!("MA", "Mastercard Incorporated", "XNYS"),
    listing!("BRK.B", "Berkshire Hathaway Inc. Class B", "XNYS", ["Berkshire Hathaway"]),
    listing!("HDB", "HDFC Bank Limited ADR", "XNYS"),
    // Energy
    listing!("XOM", "Exxon Mobil Corporation", "XNYS", ["Exxon"]),
    listing!("CVX", "Chevron Corporation", "XNYS"),
    // Consumer
    listing!("AMZN", "Amazon.com, Inc.", "XNAS", ["Amazon"]),
    listing!("TSLA", "Tesla, Inc.", "XNAS"),
    listing!("HD", "The Home Depot, Inc.", "XNYS", ["Home Depot"]),
    listing!("NKE", "NIKE, Inc.", "XNYS"),
    listing!("MCD", "McDonald's Corporation", "XNYS"),
    listing!("PG", "The Procter & Gamble Company", "XNYS", ["Procter & Gamble"]),
    listing!("KO", "The Coca-Cola Company", "XNYS", ["Coca-Cola"]),
    listing!("PEP", "PepsiCo, Inc.", "XNAS"),
    listing!("COST", "Costco Wholesale Corporation", "XNAS", ["Costco"]),
    listing!("WMT", "Walmart Inc.", "XNYS"),
    // Industrials
    listing!("CAT", "Caterpillar Inc.", "XNYS"),
    listing!("BA", "The Boeing Company", "XNYS", ["Boeing"]),
    listing!("GE", "GE Aerospace", "XNYS", ["General Electric"]),
    // Communications
    listing!("NFLX", "Netflix, Inc.", "XNAS"),
    listing!("DIS", "The Walt Disney Company", "XNYS", ["Disney"]),
    listing!("T", "AT&T Inc.", "XNYS"),
    listing!("VZ", "Verizon Communications Inc.", "XNYS", ["Verizon"]),
];
