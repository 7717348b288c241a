/*!
 * Hierarchical device names.
 *
 * Devices are addressed by dotted names such as `rack.motor.x`. A [`Name`]
 * is an ordered sequence of [`NameToken`]s; the empty name is valid and
 * addresses the current container itself.
 */
use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// The separator between name segments
pub const NAME_SEPARATOR: char = '.';

/// One segment of a dotted name. Never empty and never contains the separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameToken(String);

impl NameToken {
    /// Create a token, rejecting empty segments and embedded separators
    pub fn new<S: Into<String>>(token: S) -> Result<Self, Error> {
        let token = token.into();
        if token.is_empty() {
            return Err(Error::InvalidName("empty name token".to_string()));
        }
        if token.contains(NAME_SEPARATOR) {
            return Err(Error::InvalidName(format!(
                "name token '{}' contains separator '{}'",
                token, NAME_SEPARATOR
            )));
        }
        Ok(Self(token))
    }

    /// The token text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Promote the token to a single-segment [`Name`]
    pub fn into_name(self) -> Name {
        Name(vec![self])
    }
}

impl fmt::Display for NameToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NameToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A dotted, hierarchical name: zero or more [`NameToken`]s
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(Vec<NameToken>);

impl Name {
    /// The empty name, addressing the current container
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Parse a dotted string. The empty string parses to the empty name.
    pub fn parse(text: &str) -> Result<Self, Error> {
        if text.is_empty() {
            return Ok(Self::empty());
        }
        let tokens = text
            .split(NAME_SEPARATOR)
            .map(NameToken::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| Error::InvalidName(format!("malformed name '{}'", text)))?;
        Ok(Self(tokens))
    }

    /// Whether the name has no segments
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The first segment, if any
    pub fn first(&self) -> Option<&NameToken> {
        self.0.first()
    }

    /// The name with its first segment removed
    pub fn cut_first(&self) -> Name {
        Name(self.0.iter().skip(1).cloned().collect())
    }

    /// Iterate over the segments
    pub fn tokens(&self) -> impl Iterator<Item = &NameToken> {
        self.0.iter()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for token in &self.0 {
            if !first {
                write!(f, "{}", NAME_SEPARATOR)?;
            }
            write!(f, "{}", token)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<NameToken> for Name {
    fn from(token: NameToken) -> Self {
        token.into_name()
    }
}

impl Add<&Name> for &NameToken {
    type Output = Name;

    /// Prefix a name with a token: `token + name`
    fn add(self, rest: &Name) -> Name {
        let mut tokens = Vec::with_capacity(1 + rest.len());
        tokens.push(self.clone());
        tokens.extend(rest.tokens().cloned());
        Name(tokens)
    }
}

impl Add<&Name> for &Name {
    type Output = Name;

    fn add(self, rest: &Name) -> Name {
        let mut tokens = Vec::with_capacity(self.len() + rest.len());
        tokens.extend(self.tokens().cloned());
        tokens.extend(rest.tokens().cloned());
        Name(tokens)
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Name::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let name = Name::parse("rack.motor.x").unwrap();
        assert_eq!(name.len(), 3);
        assert_eq!(name.to_string(), "rack.motor.x");
        assert_eq!(name.first().unwrap().as_str(), "rack");
        assert_eq!(name.cut_first().to_string(), "motor.x");
    }

    #[test]
    fn test_empty_name() {
        let name = Name::parse("").unwrap();
        assert!(name.is_empty());
        assert_eq!(name.to_string(), "");
        assert!(name.first().is_none());
    }

    #[test]
    fn test_malformed_names() {
        assert!(Name::parse("a..b").is_err());
        assert!(Name::parse(".a").is_err());
        assert!(NameToken::new("").is_err());
        assert!(NameToken::new("a.b").is_err());
    }

    #[test]
    fn test_concatenation() {
        let token = NameToken::new("rack").unwrap();
        let rest = Name::parse("motor.x").unwrap();
        assert_eq!((&token + &rest).to_string(), "rack.motor.x");

        let empty = Name::empty();
        assert_eq!((&token + &empty).to_string(), "rack");
    }

    #[test]
    fn test_serde_as_dotted_string() {
        let name = Name::parse("a.b").unwrap();
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"a.b\"");
        let back: Name = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }
}
