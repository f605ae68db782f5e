//! Declarative property schema.
//!
//! The schema is a capability table: for each CSS property it records which
//! value shapes may survive sanitization (a bitmask), which literal
//! keywords are admitted (groups whose union is computed lazily and cached)
//! and which nested function calls are admitted, each resolving to another
//! entry in the same table. Anything the schema does not name is deleted.
//!
//! The built-in table covers the common CSS2.1-era properties; callers can
//! supply their own table, including from a JSON document.

use std::collections::{HashMap, HashSet};
use std::ops::BitOr;
use std::sync::{Arc, OnceLock};

use lazy_static::lazy_static;
use serde::Deserialize;

use crate::error::{SchemaError, SchemaResult};

/// Bitmask of value categories a property admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValueBits(u32);

impl ValueBits {
    pub const NONE: ValueBits = ValueBits(0);
    /// Non-negative numeric quantities, with or without a unit.
    pub const QUANTITY: ValueBits = ValueBits(1);
    /// Negative quantities too. Meaningless without `QUANTITY`.
    pub const NEGATIVE_QUANTITY: ValueBits = ValueBits(1 << 1);
    /// `#rgb` / `#rrggbb` hash colors.
    pub const HASH_VALUE: ValueBits = ValueBits(1 << 2);
    /// Quoted strings kept as plain text content.
    pub const QSTRING_CONTENT: ValueBits = ValueBits(1 << 3);
    /// Quoted strings and `url(...)` treated as URLs, subject to policy.
    pub const QSTRING_URL: ValueBits = ValueBits(1 << 4);
    /// Property may vary between visited and unvisited link styling.
    pub const ALLOWED_IN_LINK: ValueBits = ValueBits(1 << 5);

    pub fn contains(self, other: ValueBits) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: ValueBits) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ValueBits {
    type Output = ValueBits;

    fn bitor(self, rhs: ValueBits) -> ValueBits {
        ValueBits(self.0 | rhs.0)
    }
}

/// One property (or nested-function) entry.
#[derive(Debug)]
pub struct PropertyEntry {
    bits: ValueBits,
    literals: Vec<Vec<String>>,
    functions: Vec<(String, String)>,
    literal_union: OnceLock<HashSet<String>>,
}

impl PropertyEntry {
    pub fn new(bits: ValueBits, literals: &[&[&str]], functions: &[(&str, &str)]) -> Self {
        Self {
            bits,
            literals: literals
                .iter()
                .map(|group| group.iter().map(|s| s.to_lowercase()).collect())
                .collect(),
            functions: functions
                .iter()
                .map(|(name, key)| (name.to_lowercase(), key.to_lowercase()))
                .collect(),
            literal_union: OnceLock::new(),
        }
    }

    pub fn bits(&self) -> ValueBits {
        self.bits
    }

    /// True if the (lowercased) token is in the union of the literal
    /// groups. The union is computed once per entry and cached; racing
    /// first computations are idempotent.
    pub fn allows_literal(&self, token: &str) -> bool {
        self.literal_union
            .get_or_init(|| {
                self.literals
                    .iter()
                    .flat_map(|group| group.iter().cloned())
                    .collect()
            })
            .contains(token)
    }

    /// Schema key for an admitted nested function, by lowercase call name.
    pub fn function_key(&self, name: &str) -> Option<&str> {
        self.functions
            .iter()
            .find(|(fn_name, _)| fn_name == name)
            .map(|(_, key)| key.as_str())
    }

    fn function_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.functions.iter().map(|(n, k)| (n.as_str(), k.as_str()))
    }
}

/// Immutable property-name → entry table.
#[derive(Debug, Default)]
pub struct PropertySchema {
    entries: HashMap<String, PropertyEntry>,
}

impl PropertySchema {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, entry: PropertyEntry) {
        self.entries.insert(name.to_lowercase(), entry);
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&PropertyEntry> {
        self.entries.get(&name.to_lowercase())
    }

    /// Load a schema from a JSON document of the form
    /// `{"color": {"bits": ["hash-value"], "literals": [["red"]],
    ///   "functions": {"rgb": "rgb()"}}}`.
    pub fn from_json(doc: &str) -> SchemaResult<PropertySchema> {
        let defs: HashMap<String, EntryDef> = serde_json::from_str(doc)?;
        let mut schema = PropertySchema::empty();
        for (name, def) in &defs {
            let mut bits = ValueBits::NONE;
            for bit in &def.bits {
                bits = bits
                    | bit_by_name(bit).ok_or_else(|| SchemaError::UnknownBit {
                        entry: name.clone(),
                        bit: bit.clone(),
                    })?;
            }
            let literals: Vec<Vec<&str>> = def
                .literals
                .iter()
                .map(|group| group.iter().map(String::as_str).collect())
                .collect();
            let literal_slices: Vec<&[&str]> =
                literals.iter().map(Vec::as_slice).collect();
            let functions: Vec<(&str, &str)> = def
                .functions
                .iter()
                .map(|(n, k)| (n.as_str(), k.as_str()))
                .collect();
            schema.insert(name, PropertyEntry::new(bits, &literal_slices, &functions));
        }
        // Every admitted function must resolve to an entry of this table.
        for (name, entry) in &schema.entries {
            for (function, key) in entry.function_entries() {
                if !schema.entries.contains_key(key) {
                    return Err(SchemaError::DanglingFunction {
                        entry: name.clone(),
                        function: function.to_string(),
                        key: key.to_string(),
                    });
                }
            }
        }
        Ok(schema)
    }
}

#[derive(Deserialize)]
struct EntryDef {
    #[serde(default)]
    bits: Vec<String>,
    #[serde(default)]
    literals: Vec<Vec<String>>,
    #[serde(default)]
    functions: HashMap<String, String>,
}

fn bit_by_name(name: &str) -> Option<ValueBits> {
    match name {
        "quantity" => Some(ValueBits::QUANTITY),
        "negative-quantity" => Some(ValueBits::NEGATIVE_QUANTITY),
        "hash-value" => Some(ValueBits::HASH_VALUE),
        "qstring-content" => Some(ValueBits::QSTRING_CONTENT),
        "qstring-url" => Some(ValueBits::QSTRING_URL),
        "allowed-in-link" => Some(ValueBits::ALLOWED_IN_LINK),
        _ => None,
    }
}

// Literal groups shared across the built-in table.
const GLOBAL: &[&str] = &["inherit", "initial", "unset"];
const COLORS: &[&str] = &[
    "aqua", "black", "blue", "fuchsia", "gray", "grey", "green", "lime",
    "maroon", "navy", "olive", "orange", "purple", "red", "silver", "teal",
    "white", "yellow", "transparent", "currentcolor",
];
const BORDER_STYLES: &[&str] = &[
    "none", "hidden", "dotted", "dashed", "solid", "double", "groove",
    "ridge", "inset", "outset",
];
const BORDER_WIDTHS: &[&str] = &["thin", "medium", "thick"];
const GENERIC_FONTS: &[&str] = &[
    "serif", "sans-serif", "monospace", "cursive", "fantasy", "system-ui",
];
const COMMA: &[&str] = &[","];
const SLASH: &[&str] = &["/"];
const AUTO: &[&str] = &["auto"];
const NONE_KW: &[&str] = &["none"];
const NORMAL: &[&str] = &["normal"];
const POSITIONS: &[&str] = &["left", "right", "top", "bottom", "center"];
const REPEATS: &[&str] = &[
    "repeat", "repeat-x", "repeat-y", "no-repeat", "space", "round",
];
const ATTACHMENTS: &[&str] = &["scroll", "fixed", "local"];
const FONT_SIZES: &[&str] = &[
    "xx-small", "x-small", "small", "medium", "large", "x-large", "xx-large",
    "smaller", "larger",
];
const FONT_WEIGHTS: &[&str] = &["normal", "bold", "bolder", "lighter"];
const FONT_STYLES: &[&str] = &["normal", "italic", "oblique"];
const LIST_TYPES: &[&str] = &[
    "disc", "circle", "square", "decimal", "decimal-leading-zero",
    "lower-roman", "upper-roman", "lower-alpha", "upper-alpha", "none",
];

const COLOR_FNS: &[(&str, &str)] = &[
    ("rgb", "rgb()"),
    ("rgba", "rgba()"),
    ("hsl", "hsl()"),
    ("hsla", "hsla()"),
];
const GRADIENT_FNS: &[(&str, &str)] = &[
    ("linear-gradient", "linear-gradient()"),
    ("radial-gradient", "radial-gradient()"),
];

fn build_default_schema() -> PropertySchema {
    use ValueBits as B;
    let q = B::QUANTITY;
    let nq = B::QUANTITY | B::NEGATIVE_QUANTITY;
    let hash = B::HASH_VALUE;
    let link = B::ALLOWED_IN_LINK;

    let mut s = PropertySchema::empty();
    let mut e = |name: &str, bits: ValueBits, lits: &[&[&str]], fns: &[(&str, &str)]| {
        s.insert(name, PropertyEntry::new(bits, lits, fns));
    };

    // Color and paint.
    e("color", hash | link, &[COLORS, GLOBAL], COLOR_FNS);
    e("background-color", hash, &[COLORS, GLOBAL], COLOR_FNS);
    e("background-image", B::QSTRING_URL, &[NONE_KW, COMMA, GLOBAL], GRADIENT_FNS);
    e("background-position", nq, &[POSITIONS, COMMA, GLOBAL], &[]);
    e("background-repeat", B::NONE, &[REPEATS, COMMA, GLOBAL], &[]);
    e("background-attachment", B::NONE, &[ATTACHMENTS, COMMA, GLOBAL], &[]);
    e(
        "background",
        nq | hash | B::QSTRING_URL,
        &[COLORS, POSITIONS, REPEATS, ATTACHMENTS, NONE_KW, COMMA, SLASH, GLOBAL],
        &[
            ("rgb", "rgb()"),
            ("rgba", "rgba()"),
            ("hsl", "hsl()"),
            ("hsla", "hsla()"),
            ("linear-gradient", "linear-gradient()"),
            ("radial-gradient", "radial-gradient()"),
        ],
    );
    e("opacity", q, &[GLOBAL], &[]);

    // Box model.
    for side in ["margin", "margin-top", "margin-right", "margin-bottom", "margin-left"] {
        e(side, nq, &[AUTO, GLOBAL], &[]);
    }
    for side in ["padding", "padding-top", "padding-right", "padding-bottom", "padding-left"] {
        e(side, q, &[GLOBAL], &[]);
    }
    for dim in ["width", "height", "min-width", "min-height", "max-width", "max-height"] {
        e(dim, q, &[AUTO, NONE_KW, GLOBAL], &[]);
    }
    for offset in ["top", "right", "bottom", "left"] {
        e(offset, nq, &[AUTO, GLOBAL], &[]);
    }
    e("box-sizing", B::NONE, &[&["content-box", "border-box"], GLOBAL], &[]);

    // Borders and outlines.
    for b in ["border", "border-top", "border-right", "border-bottom", "border-left"] {
        e(b, q | hash, &[COLORS, BORDER_STYLES, BORDER_WIDTHS, GLOBAL], COLOR_FNS);
    }
    e("border-color", hash | link, &[COLORS, GLOBAL], COLOR_FNS);
    for c in ["border-top-color", "border-right-color", "border-bottom-color", "border-left-color"] {
        e(c, hash | link, &[COLORS, GLOBAL], COLOR_FNS);
    }
    e("border-style", B::NONE, &[BORDER_STYLES, GLOBAL], &[]);
    for st in ["border-top-style", "border-right-style", "border-bottom-style", "border-left-style"] {
        e(st, B::NONE, &[BORDER_STYLES, GLOBAL], &[]);
    }
    e("border-width", q, &[BORDER_WIDTHS, GLOBAL], &[]);
    for w in ["border-top-width", "border-right-width", "border-bottom-width", "border-left-width"] {
        e(w, q, &[BORDER_WIDTHS, GLOBAL], &[]);
    }
    e("border-radius", q, &[SLASH, GLOBAL], &[]);
    e("border-collapse", B::NONE, &[&["collapse", "separate"], GLOBAL], &[]);
    e("border-spacing", q, &[GLOBAL], &[]);
    e("outline", q | hash, &[COLORS, BORDER_STYLES, BORDER_WIDTHS, &["invert"], GLOBAL], COLOR_FNS);
    e("outline-color", hash | link, &[COLORS, &["invert"], GLOBAL], COLOR_FNS);
    e("outline-style", B::NONE, &[BORDER_STYLES, GLOBAL], &[]);
    e("outline-width", q, &[BORDER_WIDTHS, GLOBAL], &[]);

    // Layout.
    e(
        "display",
        B::NONE,
        &[
            &[
                "block", "inline", "inline-block", "flex", "inline-flex",
                "grid", "inline-grid", "table", "table-row", "table-cell",
                "table-caption", "list-item", "contents", "none",
            ],
            GLOBAL,
        ],
        &[],
    );
    e("position", B::NONE, &[&["static", "relative", "absolute", "fixed", "sticky"], GLOBAL], &[]);
    e("float", B::NONE, &[&["left", "right", "none"], GLOBAL], &[]);
    e("clear", B::NONE, &[&["left", "right", "both", "none"], GLOBAL], &[]);
    for o in ["overflow", "overflow-x", "overflow-y"] {
        e(o, B::NONE, &[&["visible", "hidden", "scroll", "auto", "clip"], GLOBAL], &[]);
    }
    e("visibility", B::NONE, &[&["visible", "hidden", "collapse"], GLOBAL], &[]);
    e("z-index", nq, &[AUTO, GLOBAL], &[]);
    e("clip", B::NONE, &[AUTO, GLOBAL], &[("rect", "rect()")]);

    // Flexbox.
    e("flex-direction", B::NONE, &[&["row", "row-reverse", "column", "column-reverse"], GLOBAL], &[]);
    e("flex-wrap", B::NONE, &[&["nowrap", "wrap", "wrap-reverse"], GLOBAL], &[]);
    e(
        "justify-content",
        B::NONE,
        &[
            &["flex-start", "flex-end", "center", "space-between", "space-around", "space-evenly", "start", "end"],
            GLOBAL,
        ],
        &[],
    );
    e("align-items", B::NONE, &[&["stretch", "flex-start", "flex-end", "center", "baseline"], GLOBAL], &[]);
    e(
        "align-content",
        B::NONE,
        &[&["stretch", "flex-start", "flex-end", "center", "space-between", "space-around"], GLOBAL],
        &[],
    );
    e("align-self", B::NONE, &[AUTO, &["stretch", "flex-start", "flex-end", "center", "baseline"], GLOBAL], &[]);
    e("flex-grow", q, &[GLOBAL], &[]);
    e("flex-shrink", q, &[GLOBAL], &[]);
    e("flex-basis", q, &[AUTO, &["content"], GLOBAL], &[]);
    e("flex", q, &[AUTO, NONE_KW, GLOBAL], &[]);
    e("order", nq, &[GLOBAL], &[]);
    for g in ["gap", "row-gap", "column-gap"] {
        e(g, q, &[NORMAL, GLOBAL], &[]);
    }

    // Fonts and text.
    e("font-family", B::QSTRING_CONTENT, &[GENERIC_FONTS, COMMA, GLOBAL], &[]);
    e("font-size", q, &[FONT_SIZES, GLOBAL], &[]);
    e("font-weight", q, &[FONT_WEIGHTS, GLOBAL], &[]);
    e("font-style", B::NONE, &[FONT_STYLES, GLOBAL], &[]);
    e("font-variant", B::NONE, &[&["normal", "small-caps"], GLOBAL], &[]);
    e(
        "font",
        q | B::QSTRING_CONTENT,
        &[GENERIC_FONTS, FONT_SIZES, FONT_WEIGHTS, FONT_STYLES, &["small-caps", "caption", "icon", "menu"], COMMA, SLASH, GLOBAL],
        &[],
    );
    e("line-height", q, &[NORMAL, GLOBAL], &[]);
    e("letter-spacing", nq, &[NORMAL, GLOBAL], &[]);
    e("word-spacing", nq, &[NORMAL, GLOBAL], &[]);
    e("text-align", B::NONE, &[&["left", "right", "center", "justify", "start", "end"], GLOBAL], &[]);
    e(
        "text-decoration",
        link,
        &[&["none", "underline", "overline", "line-through", "blink"], GLOBAL],
        &[],
    );
    e("text-transform", B::NONE, &[&["none", "capitalize", "uppercase", "lowercase"], GLOBAL], &[]);
    e("text-indent", nq, &[GLOBAL], &[]);
    e("text-overflow", B::QSTRING_CONTENT, &[&["clip", "ellipsis"], GLOBAL], &[]);
    e("white-space", B::NONE, &[&["normal", "nowrap", "pre", "pre-wrap", "pre-line"], GLOBAL], &[]);
    e(
        "vertical-align",
        nq,
        &[&["baseline", "sub", "super", "top", "text-top", "middle", "bottom", "text-bottom"], GLOBAL],
        &[],
    );
    e("overflow-wrap", B::NONE, &[&["normal", "break-word", "anywhere"], GLOBAL], &[]);
    e("word-wrap", B::NONE, &[&["normal", "break-word"], GLOBAL], &[]);
    e(
        "text-shadow",
        nq | hash,
        &[COLORS, COMMA, GLOBAL],
        COLOR_FNS,
    );

    // Lists and tables.
    e("list-style-type", B::NONE, &[LIST_TYPES, GLOBAL], &[]);
    e("list-style-position", B::NONE, &[&["inside", "outside"], GLOBAL], &[]);
    e("list-style-image", B::QSTRING_URL, &[NONE_KW, GLOBAL], &[]);
    e("list-style", B::QSTRING_URL, &[LIST_TYPES, &["inside", "outside"], GLOBAL], &[]);
    e("caption-side", B::NONE, &[&["top", "bottom"], GLOBAL], &[]);
    e("empty-cells", B::NONE, &[&["show", "hide"], GLOBAL], &[]);
    e("table-layout", B::NONE, &[AUTO, &["fixed"], GLOBAL], &[]);

    // Generated content and interaction.
    e(
        "content",
        B::QSTRING_CONTENT,
        &[&["normal", "none", "open-quote", "close-quote", "no-open-quote", "no-close-quote"], GLOBAL],
        &[],
    );
    e("quotes", B::QSTRING_CONTENT, &[NONE_KW, GLOBAL], &[]);
    e(
        "cursor",
        B::NONE,
        &[
            &["auto", "default", "pointer", "crosshair", "move", "text", "wait", "help", "progress", "not-allowed"],
            COMMA, GLOBAL,
        ],
        &[],
    );
    e("box-shadow", nq | hash, &[COLORS, &["inset"], COMMA, GLOBAL], COLOR_FNS);

    // Nested function argument schemas.
    e("rgb()", q, &[COMMA], &[]);
    e("rgba()", q, &[COMMA], &[]);
    e("hsl()", q, &[COMMA], &[]);
    e("hsla()", q, &[COMMA], &[]);
    e(
        "linear-gradient()",
        nq | hash,
        &[COLORS, &["to", "left", "right", "top", "bottom"], COMMA],
        COLOR_FNS,
    );
    e(
        "radial-gradient()",
        nq | hash,
        &[
            COLORS,
            &[
                "circle", "ellipse", "closest-side", "closest-corner",
                "farthest-side", "farthest-corner", "at", "center", "left",
                "right", "top", "bottom",
            ],
            COMMA,
        ],
        COLOR_FNS,
    );
    e("rect()", nq, &[AUTO, COMMA], &[]);

    s
}

lazy_static! {
    static ref DEFAULT_SCHEMA: Arc<PropertySchema> = Arc::new(build_default_schema());
}

/// The built-in property schema.
pub fn default_schema() -> Arc<PropertySchema> {
    Arc::clone(&DEFAULT_SCHEMA)
}
