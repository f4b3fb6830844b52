//! Label tables coupled positionally to the trained models' output layouts.
//!
//! The tables are indexed by argmax position (classifier) or decoded symbol
//! index (OCR). Order matters; never reorder an entry.

/// Vehicle colors, in the order of the classifier's `color` output.
pub const VEHICLE_COLORS: [&str; 7] = ["white", "gray", "yellow", "red", "green", "blue", "black"];

/// Vehicle body types, in the order of the classifier's `type` output.
pub const VEHICLE_TYPES: [&str; 4] = ["car", "bus", "truck", "van"];

/// Number of leading digit symbols in [`PLATE_SYMBOLS`].
pub const PLATE_DIGIT_COUNT: usize = 10;

/// Number of region/administrative codes following the digits.
pub const PLATE_REGION_COUNT: usize = 38;

/// Number of trailing uppercase letters.
pub const PLATE_LETTER_COUNT: usize = 26;

/// Plate alphabet: digits, region/administrative codes, then `A`..`Z`.
///
/// Entries 45..=47 (`<embassy>`, `<consulate>`, `<trailer>`) are placeholders
/// that keep the letters at 48..=73; they are not confirmed model symbols.
pub const PLATE_SYMBOLS: [&str; PLATE_DIGIT_COUNT + PLATE_REGION_COUNT + PLATE_LETTER_COUNT] = [
    "0",
    "1",
    "2",
    "3",
    "4",
    "5",
    "6",
    "7",
    "8",
    "9",
    "<Anhui>",
    "<Beijing>",
    "<Chongqing>",
    "<Fujian>",
    "<Gansu>",
    "<Guangdong>",
    "<Guangxi>",
    "<Guizhou>",
    "<Hainan>",
    "<Hebei>",
    "<Heilongjiang>",
    "<Henan>",
    "<HongKong>",
    "<Hubei>",
    "<Hunan>",
    "<InnerMongolia>",
    "<Jiangsu>",
    "<Jiangxi>",
    "<Jilin>",
    "<Liaoning>",
    "<Macau>",
    "<Ningxia>",
    "<Qinghai>",
    "<Shaanxi>",
    "<Shandong>",
    "<Shanghai>",
    "<Shanxi>",
    "<Sichuan>",
    "<Taiwan>",
    "<Tianjin>",
    "<Tibet>",
    "<Xinjiang>",
    "<Yunnan>",
    "<Zhejiang>",
    "<police>",
    // placeholders, see above
    "<embassy>",
    "<consulate>",
    "<trailer>",
    "A",
    "B",
    "C",
    "D",
    "E",
    "F",
    "G",
    "H",
    "I",
    "J",
    "K",
    "L",
    "M",
    "N",
    "O",
    "P",
    "Q",
    "R",
    "S",
    "T",
    "U",
    "V",
    "W",
    "X",
    "Y",
    "Z",
];
