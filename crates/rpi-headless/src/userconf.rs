use sha_crypt::{Sha512Params, sha512_check, sha512_simple};

use crate::error::{Error, Result};

pub const USERCONF_FILE: &str = "userconf.txt";

// glibc's default; also what `openssl passwd -6` produces.
const SHA512_ROUNDS: usize = 5_000;

pub fn validate_user_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let head_ok = matches!(chars.next(), Some('a'..='z' | '_'));
    let tail_ok = chars.all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_' | '-'));
    if !head_ok || !tail_ok || name.len() > 32 {
        return Err(Error::usage(format!(
            "invalid user name '{name}' (lower-case letters, digits, '_' and '-', max 32)"
        )));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String> {
    let params = Sha512Params::new(SHA512_ROUNDS)
        .map_err(|e| Error::msg(format!("sha512-crypt params error: {e:?}")))?;
    sha512_simple(password, &params)
        .map_err(|e| Error::msg(format!("sha512-crypt hashing failed: {e:?}")))
}

pub fn verify_password(password: &str, hashed: &str) -> bool {
    sha512_check(password, hashed).is_ok()
}

/// `userconf.txt` body: `user:hash` on one line.
pub fn render(user: &str, password: &str) -> Result<String> {
    validate_user_name(user)?;
    if password.is_empty() {
        return Err(Error::usage("user password must not be empty"));
    }
    Ok(format!("{user}:{}\n", hash_password(password)?))
}

/// User name recorded in an existing `userconf.txt`.
pub fn user_of(content: &str) -> Option<&str> {
    content
        .lines()
        .next()
        .and_then(|l| l.split_once(':'))
        .map(|(user, _)| user)
        .filter(|u| !u.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_verifiable_sha512_crypt_line() {
        let line = render("pi", "raspberry").expect("render");
        let (user, hash) = line.trim_end().split_once(':').expect("user:hash");
        assert_eq!(user, "pi");
        assert!(hash.starts_with("$6$"), "{hash}");
        assert!(verify_password("raspberry", hash));
        assert!(!verify_password("raspberri", hash));
        assert_eq!(user_of(&line), Some("pi"));
    }

    #[test]
    fn salts_differ_between_runs() {
        assert_ne!(hash_password("x").unwrap(), hash_password("x").unwrap());
    }

    #[test]
    fn user_name_rules() {
        for ok in ["pi", "_svc", "dev-1", "a"] {
            validate_user_name(ok).expect(ok);
        }
        let long = "a".repeat(33);
        for bad in ["", "Pi", "1pi", "pi user", "root:x", long.as_str()] {
            assert!(validate_user_name(bad).is_err(), "accepted '{bad}'");
        }
    }
}
