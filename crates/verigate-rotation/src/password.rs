//! Password policy and random value generation.
//!
//! A [`PasswordPolicy`] is a set of independent toggles plus a length. The
//! [`RandomPasswordGenerator`] draws from the union of the included
//! character classes and, when asked to, guarantees that every included
//! class appears at least once.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::SecretString;

/// Default generated length.
pub const DEFAULT_LENGTH: usize = 32;

/// Upper bound on the generated length.
pub const MAX_LENGTH: usize = 4096;

const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const NUMBERS: &str = "0123456789";
/// ASCII printable punctuation.
pub const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Character-set policy for generated secret values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PasswordPolicy {
    /// Number of characters to generate.
    pub length: usize,
    /// Individual characters never to use.
    pub exclude_characters: String,
    /// Leave out `a-z`.
    pub exclude_lowercase: bool,
    /// Leave out `A-Z`.
    pub exclude_uppercase: bool,
    /// Leave out `0-9`.
    pub exclude_numbers: bool,
    /// Leave out punctuation.
    pub exclude_punctuation: bool,
    /// Allow the space character.
    pub include_space: bool,
    /// Use at least one character from every included class.
    pub require_each_included_type: bool,
}

impl PasswordPolicy {
    /// Creates the default policy: 32 characters from every class, each class
    /// represented.
    #[must_use]
    pub fn new() -> Self {
        Self {
            length: DEFAULT_LENGTH,
            exclude_characters: String::new(),
            exclude_lowercase: false,
            exclude_uppercase: false,
            exclude_numbers: false,
            exclude_punctuation: false,
            include_space: false,
            require_each_included_type: true,
        }
    }

    /// Set the generated length.
    #[must_use]
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    /// Set characters that must never be generated.
    #[must_use]
    pub fn with_exclude_characters(mut self, chars: impl Into<String>) -> Self {
        self.exclude_characters = chars.into();
        self
    }

    /// Leave out lowercase letters.
    #[must_use]
    pub fn without_lowercase(mut self) -> Self {
        self.exclude_lowercase = true;
        self
    }

    /// Leave out uppercase letters.
    #[must_use]
    pub fn without_uppercase(mut self) -> Self {
        self.exclude_uppercase = true;
        self
    }

    /// Leave out digits.
    #[must_use]
    pub fn without_numbers(mut self) -> Self {
        self.exclude_numbers = true;
        self
    }

    /// Leave out punctuation.
    #[must_use]
    pub fn without_punctuation(mut self) -> Self {
        self.exclude_punctuation = true;
        self
    }

    /// Allow spaces.
    #[must_use]
    pub fn with_space(mut self) -> Self {
        self.include_space = true;
        self
    }

    /// Set whether every included class must be represented.
    #[must_use]
    pub fn require_each_included_type(mut self, require: bool) -> Self {
        self.require_each_included_type = require;
        self
    }

    /// Included character classes after exclusions, empty classes dropped.
    ///
    /// Space is never part of the required classes.
    fn classes(&self) -> Vec<Vec<char>> {
        [
            (LOWERCASE, self.exclude_lowercase),
            (UPPERCASE, self.exclude_uppercase),
            (NUMBERS, self.exclude_numbers),
            (PUNCTUATION, self.exclude_punctuation),
        ]
        .into_iter()
        .filter(|(_, excluded)| !excluded)
        .map(|(class, _)| self.filter_excluded(class))
        .filter(|class| !class.is_empty())
        .collect()
    }

    fn filter_excluded(&self, class: &str) -> Vec<char> {
        class
            .chars()
            .filter(|c| !self.exclude_characters.contains(*c))
            .collect()
    }

    fn space_allowed(&self) -> bool {
        self.include_space && !self.exclude_characters.contains(' ')
    }

    /// Checks that the policy can produce a value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPolicy`] if the length is out of range, no
    /// character class remains, or the length cannot fit one character of
    /// every required class.
    pub fn validate(&self) -> Result<()> {
        if self.length == 0 || self.length > MAX_LENGTH {
            return Err(Error::InvalidPolicy {
                reason: format!("length must be between 1 and {MAX_LENGTH}"),
            });
        }

        let classes = self.classes();
        if classes.is_empty() {
            return Err(Error::InvalidPolicy {
                reason: "every character class is excluded".to_string(),
            });
        }

        if self.require_each_included_type && self.length < classes.len() {
            return Err(Error::InvalidPolicy {
                reason: format!(
                    "length {} cannot include one character from each of {} classes",
                    self.length,
                    classes.len()
                ),
            });
        }

        Ok(())
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Produces candidate secret values.
pub trait PasswordGenerator: Send + Sync {
    /// Generates a value that satisfies `policy`.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy is invalid or generation fails.
    fn generate(&self, policy: &PasswordPolicy) -> Result<SecretString>;
}

impl<G: PasswordGenerator + ?Sized> PasswordGenerator for std::sync::Arc<G> {
    fn generate(&self, policy: &PasswordPolicy) -> Result<SecretString> {
        (**self).generate(policy)
    }
}

/// Generator backed by the thread-local CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPasswordGenerator;

impl RandomPasswordGenerator {
    /// Creates a generator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl PasswordGenerator for RandomPasswordGenerator {
    fn generate(&self, policy: &PasswordPolicy) -> Result<SecretString> {
        policy.validate()?;

        let classes = policy.classes();
        let mut pool: Vec<char> = classes.concat();
        if policy.space_allowed() {
            pool.push(' ');
        }

        let mut rng = rand::thread_rng();
        let mut chars = Vec::with_capacity(policy.length);

        if policy.require_each_included_type {
            for class in &classes {
                chars.push(class[rng.gen_range(0..class.len())]);
            }
        }
        while chars.len() < policy.length {
            chars.push(pool[rng.gen_range(0..pool.len())]);
        }
        chars.shuffle(&mut rng);

        Ok(SecretString::new(chars.into_iter().collect::<String>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn generate(policy: &PasswordPolicy) -> String {
        RandomPasswordGenerator::new()
            .generate(policy)
            .expect("valid policy")
            .expose()
            .to_string()
    }

    #[test]
    fn default_policy_covers_every_class() {
        let value = generate(&PasswordPolicy::default());
        assert_eq!(value.chars().count(), DEFAULT_LENGTH);
        assert!(value.chars().any(|c| c.is_ascii_lowercase()));
        assert!(value.chars().any(|c| c.is_ascii_uppercase()));
        assert!(value.chars().any(|c| c.is_ascii_digit()));
        assert!(value.chars().any(|c| PUNCTUATION.contains(c)));
        assert!(!value.contains(' '));
    }

    #[test]
    fn length_32_without_punctuation() {
        let policy = PasswordPolicy::new().with_length(32).without_punctuation();
        for _ in 0..50 {
            let value = generate(&policy);
            assert_eq!(value.len(), 32);
            assert!(!value.chars().any(|c| PUNCTUATION.contains(c)));
        }
    }

    #[test]
    fn excluded_characters_never_appear() {
        let policy = PasswordPolicy::new()
            .with_length(200)
            .with_exclude_characters("aeiouAEIOU01");
        let value = generate(&policy);
        assert!(!value.chars().any(|c| "aeiouAEIOU01".contains(c)));
    }

    #[test]
    fn digits_only() {
        let policy = PasswordPolicy::new()
            .with_length(12)
            .without_lowercase()
            .without_uppercase()
            .without_punctuation();
        let value = generate(&policy);
        assert_eq!(value.len(), 12);
        assert!(value.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn space_only_when_included() {
        let policy = PasswordPolicy::new()
            .with_length(400)
            .without_uppercase()
            .without_numbers()
            .without_punctuation()
            .with_space();
        let value = generate(&policy);
        assert!(value.chars().all(|c| c == ' ' || c.is_ascii_lowercase()));
    }

    #[test_case(PasswordPolicy::new().with_length(0) ; "zero length")]
    #[test_case(PasswordPolicy::new().with_length(MAX_LENGTH + 1) ; "too long")]
    #[test_case(
        PasswordPolicy::new()
            .without_lowercase()
            .without_uppercase()
            .without_numbers()
            .without_punctuation() ; "every class excluded")]
    #[test_case(
        PasswordPolicy::new()
            .without_lowercase()
            .without_uppercase()
            .without_punctuation()
            .with_exclude_characters(NUMBERS) ; "remaining class emptied by exclusions")]
    #[test_case(PasswordPolicy::new().with_length(3) ; "shorter than required classes")]
    fn invalid_policies_are_rejected(policy: PasswordPolicy) {
        let result = RandomPasswordGenerator::new().generate(&policy);
        assert!(matches!(result, Err(Error::InvalidPolicy { .. })));
    }

    #[test]
    fn space_alone_is_not_a_usable_class() {
        let policy = PasswordPolicy::new()
            .without_lowercase()
            .without_uppercase()
            .without_numbers()
            .without_punctuation()
            .with_space();
        assert!(policy.validate().is_err());
    }

    #[test]
    fn short_length_allowed_without_requirement() {
        let policy = PasswordPolicy::new()
            .with_length(1)
            .require_each_included_type(false);
        assert_eq!(generate(&policy).chars().count(), 1);
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: PasswordPolicy =
            serde_json::from_str(r#"{"length": 16, "excludePunctuation": true}"#)
                .expect("deserialize");
        assert_eq!(policy.length, 16);
        assert!(policy.exclude_punctuation);
        assert!(policy.require_each_included_type);
    }

    proptest! {
        #[test]
        fn prop_generated_value_honors_policy(
            length in 4usize..96,
            exclude_lowercase in any::<bool>(),
            exclude_uppercase in any::<bool>(),
            exclude_numbers in any::<bool>(),
            exclude_punctuation in any::<bool>(),
            include_space in any::<bool>(),
        ) {
            let policy = PasswordPolicy {
                length,
                exclude_characters: String::new(),
                exclude_lowercase,
                exclude_uppercase,
                exclude_numbers,
                exclude_punctuation,
                include_space,
                require_each_included_type: true,
            };
            prop_assume!(policy.validate().is_ok());

            let value = generate(&policy);
            prop_assert_eq!(value.chars().count(), length);

            let checks: [(bool, fn(&char) -> bool); 4] = [
                (exclude_lowercase, char::is_ascii_lowercase),
                (exclude_uppercase, char::is_ascii_uppercase),
                (exclude_numbers, char::is_ascii_digit),
                (exclude_punctuation, |c| PUNCTUATION.contains(*c)),
            ];
            for (excluded, in_class) in checks {
                if excluded {
                    prop_assert!(!value.chars().any(|c| in_class(&c)));
                } else {
                    prop_assert!(value.chars().any(|c| in_class(&c)));
                }
            }
            if !include_space {
                prop_assert!(!value.contains(' '));
            }
        }
    }
}
