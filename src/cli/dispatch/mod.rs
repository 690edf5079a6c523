use crate::cli::actions::{
    server::{Args, Storage},
    Action,
};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map parsed arguments to the action to run.
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);

    let storage = if matches.get_flag("in-memory") {
        Storage::Memory
    } else {
        let dsn = matches
            .get_one::<String>("dsn")
            .cloned()
            .context("missing required argument: --dsn")?;
        Storage::Postgres {
            dsn: SecretString::from(dsn),
        }
    };

    let session_ttl_seconds = matches
        .get_one::<i64>("session-ttl-seconds")
        .copied()
        .unwrap_or(43_200);

    Ok(Action::Server(Args {
        port,
        storage,
        session_ttl_seconds,
        cookie_secure: matches.get_flag("cookie-secure"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn test_handler_postgres() -> Result<()> {
        temp_env::with_vars([("PASSGATE_IN_MEMORY", None::<&str>)], || {
            let matches = commands::new().get_matches_from(vec![
                "passgate",
                "--dsn",
                "postgres://localhost/passgate",
                "--cookie-secure",
            ]);
            let Action::Server(args) = handler(&matches)?;
            assert_eq!(args.port, 8080);
            assert!(args.cookie_secure);
            match args.storage {
                Storage::Postgres { dsn } => {
                    assert_eq!(dsn.expose_secret(), "postgres://localhost/passgate");
                }
                Storage::Memory => anyhow::bail!("expected postgres storage"),
            }
            Ok(())
        })
    }

    #[test]
    fn test_handler_in_memory() -> Result<()> {
        let matches = commands::new().get_matches_from(vec![
            "passgate",
            "--in-memory",
            "--session-ttl-seconds",
            "120",
        ]);
        let Action::Server(args) = handler(&matches)?;
        assert!(matches!(args.storage, Storage::Memory));
        assert_eq!(args.session_ttl_seconds, 120);
        assert!(!args.cookie_secure);
        Ok(())
    }
}
