//! Common value types: agent ids, bits, observation keys and rules.

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Index of an agent in the flat agent arena.
pub type AgentId = usize;

/// Index of a cycle in the topology's cycle list.
pub type CycleId = usize;

/// A binary agent state.
///
/// Serialized as the strings `"0"` and `"1"` so exported data matches the
/// snapshot format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Bit {
    #[serde(rename = "0")]
    Zero,
    #[serde(rename = "1")]
    One,
}

impl Bit {
    /// Parses `'0'` or `'1'`.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Bit::Zero),
            '1' => Some(Bit::One),
            _ => None,
        }
    }

    /// Returns `'0'` or `'1'`.
    pub fn as_char(self) -> char {
        match self {
            Bit::Zero => '0',
            Bit::One => '1',
        }
    }

    pub fn is_one(self) -> bool {
        self == Bit::One
    }

    /// Returns the opposite bit.
    pub fn flip(self) -> Self {
        match self {
            Bit::Zero => Bit::One,
            Bit::One => Bit::Zero,
        }
    }

    /// Draws a uniformly random bit from the supplied generator.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Bit::from(rng.gen::<bool>())
    }
}

impl From<bool> for Bit {
    fn from(value: bool) -> Self {
        if value {
            Bit::One
        } else {
            Bit::Zero
        }
    }
}

impl fmt::Display for Bit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Renders a state vector in the snapshot format (`'0'`/`'1'` per agent).
pub fn render_bits(bits: &[Bit]) -> String {
    bits.iter().map(|b| b.as_char()).collect()
}

/// Parses a bitstring; returns `None` on any character other than `0`/`1`.
pub fn parse_bits(s: &str) -> Option<Vec<Bit>> {
    s.chars().map(Bit::from_char).collect()
}

/// Number of agents in state `1`.
pub fn count_ones(bits: &[Bit]) -> usize {
    bits.iter().filter(|b| b.is_one()).count()
}

/// Fixed-width key built from the states of an agent's neighbours.
///
/// The first neighbour occupies the most significant position, so the
/// rendered key reads in neighbour order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservationKey {
    bits: u64,
    width: u8,
}

impl ObservationKey {
    /// Widest key representable (and so the largest neighbour set).
    pub const MAX_WIDTH: usize = 64;

    /// The zero-width key observed by agents that ignore all input.
    pub fn empty() -> Self {
        Self { bits: 0, width: 0 }
    }

    /// Builds a key from neighbour states in order.
    pub fn from_bits<I: IntoIterator<Item = Bit>>(bits: I) -> Self {
        let mut key = Self::empty();
        for bit in bits {
            key.push(bit);
        }
        key
    }

    /// Appends one neighbour state as the new least significant position.
    pub fn push(&mut self, bit: Bit) {
        debug_assert!((self.width as usize) < Self::MAX_WIDTH, "observation key overflow");
        self.bits = (self.bits << 1) | u64::from(bit.is_one());
        self.width += 1;
    }

    pub fn width(&self) -> usize {
        self.width as usize
    }

    pub fn value(&self) -> u64 {
        self.bits
    }
}

impl fmt::Display for ObservationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pos in (0..self.width).rev() {
            let bit = (self.bits >> pos) & 1;
            write!(f, "{}", bit)?;
        }
        Ok(())
    }
}

impl FromStr for ObservationKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.chars().count() > Self::MAX_WIDTH {
            return Err(format!("observation key '{}' wider than {} bits", s, Self::MAX_WIDTH));
        }
        parse_bits(s)
            .map(Self::from_bits)
            .ok_or_else(|| format!("invalid observation key '{}'", s))
    }
}

impl Serialize for ObservationKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObservationKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Lookup table from observation keys of one fixed width to next-state bits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedRule {
    width: usize,
    table: BTreeMap<ObservationKey, Bit>,
}

impl KeyedRule {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            table: BTreeMap::new(),
        }
    }

    /// Builds a rule from a table whose keys all share `width`.
    pub fn from_table(width: usize, table: BTreeMap<ObservationKey, Bit>) -> Self {
        debug_assert!(table.keys().all(|k| k.width() == width));
        Self { width, table }
    }

    /// The identity rule over a single neighbour: copy what you see.
    pub fn copy() -> Self {
        let mut rule = Self::new(1);
        rule.insert(ObservationKey::from_bits([Bit::Zero]), Bit::Zero);
        rule.insert(ObservationKey::from_bits([Bit::One]), Bit::One);
        rule
    }

    /// Inserts a mapping, returning any previous target for the key.
    pub fn insert(&mut self, key: ObservationKey, target: Bit) -> Option<Bit> {
        self.table.insert(key, target)
    }

    /// Looks up a key; keys of the wrong width never match.
    pub fn get(&self, key: ObservationKey) -> Option<Bit> {
        if key.width() != self.width {
            return None;
        }
        self.table.get(&key).copied()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObservationKey, Bit)> + '_ {
        self.table.iter().map(|(k, v)| (*k, *v))
    }

    /// Returns the single target bit if every key maps to it.
    pub fn uniform_output(&self) -> Option<Bit> {
        let mut targets = self.table.values();
        let first = *targets.next()?;
        targets.all(|t| *t == first).then_some(first)
    }
}

/// An agent's update rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Rule {
    /// Non-reactive: always emit this bit.
    Constant(Bit),
    /// Emit the bit recorded for the observed key.
    Keyed(KeyedRule),
}

impl Rule {
    pub fn is_constant(&self) -> bool {
        matches!(self, Rule::Constant(_))
    }

    /// Next-state bit for `key`, or `None` for a key never seen in inference.
    pub fn apply(&self, key: ObservationKey) -> Option<Bit> {
        match self {
            Rule::Constant(bit) => Some(*bit),
            Rule::Keyed(table) => table.get(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_chars_and_flip() {
        assert_eq!(Bit::from_char('1'), Some(Bit::One));
        assert_eq!(Bit::from_char('x'), None);
        assert_eq!(Bit::Zero.flip(), Bit::One);
        assert_eq!(Bit::One.as_char(), '1');
    }

    #[test]
    fn test_render_and_parse_bits() {
        let bits = parse_bits("10110").unwrap();
        assert_eq!(count_ones(&bits), 3);
        assert_eq!(render_bits(&bits), "10110");
        assert!(parse_bits("10a").is_none());
    }

    #[test]
    fn test_observation_key_order() {
        let key = ObservationKey::from_bits([Bit::One, Bit::Zero, Bit::Zero]);
        assert_eq!(key.width(), 3);
        assert_eq!(key.value(), 0b100);
        assert_eq!(key.to_string(), "100");

        // Leading zeros survive rendering
        let key = ObservationKey::from_bits([Bit::Zero, Bit::One]);
        assert_eq!(key.to_string(), "01");
        assert_eq!("01".parse::<ObservationKey>().unwrap(), key);
    }

    #[test]
    fn test_empty_key_renders_empty() {
        assert_eq!(ObservationKey::empty().to_string(), "");
        assert_eq!("".parse::<ObservationKey>().unwrap(), ObservationKey::empty());
    }

    #[test]
    fn test_keyed_rule_rejects_wrong_width() {
        let rule = KeyedRule::copy();
        assert_eq!(rule.get(ObservationKey::from_bits([Bit::One])), Some(Bit::One));
        assert_eq!(rule.get(ObservationKey::from_bits([Bit::One, Bit::One])), None);
        assert_eq!(rule.uniform_output(), None);
    }

    #[test]
    fn test_rule_apply() {
        let constant = Rule::Constant(Bit::One);
        assert_eq!(constant.apply(ObservationKey::empty()), Some(Bit::One));

        let mut table = KeyedRule::new(2);
        table.insert("01".parse().unwrap(), Bit::One);
        let keyed = Rule::Keyed(table);
        assert_eq!(keyed.apply("01".parse().unwrap()), Some(Bit::One));
        assert_eq!(keyed.apply("11".parse().unwrap()), None);
    }

    #[test]
    fn test_rule_json_shape() {
        let json = serde_json::to_value(Rule::Keyed(KeyedRule::copy())).unwrap();
        assert_eq!(json["kind"], "keyed");
        assert_eq!(json["value"]["table"]["1"], "1");

        let back: Rule = serde_json::from_value(json).unwrap();
        assert_eq!(back, Rule::Keyed(KeyedRule::copy()));
    }
}
