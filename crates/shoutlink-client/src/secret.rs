//! Password references.
//!
//! A password in `config.toml` or on the command line may point somewhere
//! else instead of holding the secret:
//!
//! - `env::VAR` reads `$VAR`
//! - `pass::path/in/store` takes the first line of `pass show path/in/store`
//!
//! Anything else is the password itself.

use std::process::Command;

/// Where a secret value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretRef<'a> {
    Plain(&'a str),
    Env(&'a str),
    Pass(&'a str),
}

impl<'a> SecretRef<'a> {
    /// Classifies `value` by its prefix.
    pub fn parse(value: &'a str) -> Self {
        if let Some(var) = value.strip_prefix("env::") {
            Self::Env(var)
        } else if let Some(path) = value.strip_prefix("pass::") {
            Self::Pass(path)
        } else {
            Self::Plain(value)
        }
    }

    /// Produces the secret.
    pub fn resolve(&self) -> Result<String, String> {
        match self {
            Self::Plain(value) => Ok((*value).to_string()),
            Self::Env(var) => {
                std::env::var(var).map_err(|_| format!("environment variable `{}` is not set", var))
            }
            Self::Pass(path) => pass_show(path),
        }
    }
}

/// Resolves a possibly indirect secret value.
pub fn resolve(value: &str) -> Result<String, String> {
    SecretRef::parse(value).resolve()
}

fn pass_show(path: &str) -> Result<String, String> {
    let output = Command::new("pass")
        .args(["show", path])
        .output()
        .map_err(|e| format!("failed to run `pass show {}`: {}", path, e))?;

    if !output.status.success() {
        return Err(format!(
            "`pass show {}` failed ({}): {}",
            path,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| format!("`pass show {}` printed nothing", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes() {
        assert_eq!(SecretRef::parse("hackme"), SecretRef::Plain("hackme"));
        assert_eq!(SecretRef::parse("env::ICE_PASS"), SecretRef::Env("ICE_PASS"));
        assert_eq!(
            SecretRef::parse("pass::radio/source"),
            SecretRef::Pass("radio/source")
        );
        assert_eq!(SecretRef::parse("envy"), SecretRef::Plain("envy"));
    }

    #[test]
    fn env_reference() {
        unsafe {
            std::env::set_var("_SHOUTLINK_TEST_PASSWORD", "s3cret");
        }
        assert_eq!(resolve("env::_SHOUTLINK_TEST_PASSWORD").unwrap(), "s3cret");
        unsafe {
            std::env::remove_var("_SHOUTLINK_TEST_PASSWORD");
        }
    }

    #[test]
    fn missing_env_reference() {
        let err = resolve("env::_SHOUTLINK_NO_SUCH_VARIABLE_4711").unwrap_err();
        assert!(err.contains("not set"));
    }

    #[test]
    fn failing_pass_reference() {
        assert!(resolve("pass::shoutlink/definitely/not/in/any/store/4711").is_err());
    }
}
