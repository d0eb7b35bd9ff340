// src/client/main.rs

use std::env;
use std::process::ExitCode;

use regserver::client::api::RegClient;
use regserver::client::entitlement::verify_registration;
use regserver::client::store::EntitlementStore;
use regserver::errors::{LicenseError, LicenseResult};

const USAGE: &str = "\
usage:
  regserver_client activate <server_url> <license_key> <machine_code> <user_name>
  regserver_client verify
  regserver_client check-update <server_url> <license_key> <machine_code> <installed_version>

`verify` reads the registration secret from REGSERVER_REGISTRATION_SECRET.";

/// Small command-line front end to the client library.
///
/// `activate` saves the returned entitlement to the platform data directory,
/// `verify` checks that saved entitlement offline.
#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> LicenseResult<()> {
    let store = EntitlementStore::default_location()?;

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["activate", url, key, machine_code, user_name] => {
            let entitlement = RegClient::new(*url)
                .activate(key, machine_code, user_name)
                .await?;
            store.save(&entitlement).await?;
            println!(
                "Activated {} for {} (expires {})",
                entitlement.machine_code, entitlement.user_company, entitlement.expiration_date
            );
            println!("Saved to {}", store.path().display());
            Ok(())
        }
        ["verify"] => {
            let secret = env::var("REGSERVER_REGISTRATION_SECRET").map_err(|_| {
                LicenseError::ConfigError("REGSERVER_REGISTRATION_SECRET is not set".to_string())
            })?;
            let entitlement = store
                .load()
                .await?
                .ok_or_else(|| LicenseError::not_found("saved entitlement"))?;
            if verify_registration(&entitlement, &secret) {
                println!("Registration is valid");
                Ok(())
            } else {
                Err(LicenseError::validation("registration hash does not match"))
            }
        }
        ["check-update", url, key, machine_code, installed] => {
            let check = RegClient::new(*url)
                .check_for_update(key, machine_code, installed)
                .await?;
            match check.download_url {
                Some(download) if check.update_available => {
                    println!("Update available: {} ({download})", check.latest_version)
                }
                _ => println!("Up to date ({})", check.current_version),
            }
            Ok(())
        }
        _ => Err(LicenseError::validation(USAGE)),
    }
}
