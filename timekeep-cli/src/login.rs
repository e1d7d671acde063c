use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

/// Use `given` when present, otherwise ask on stdin.
pub fn value_or_prompt(given: Option<String>, label: &str) -> Result<String> {
    if let Some(value) = given.filter(|v| !v.trim().is_empty()) {
        return Ok(value);
    }

    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .with_context(|| format!("Failed to read {}", label.to_lowercase()))?;

    let value = line.trim().to_string();
    if value.is_empty() {
        anyhow::bail!("{} is required", label);
    }
    Ok(value)
}

/// Read a password without echoing it.
pub fn prompt_password() -> Result<String> {
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;
    if password.is_empty() {
        anyhow::bail!("Password is required");
    }
    Ok(password)
}
