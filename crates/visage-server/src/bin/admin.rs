//! Out-of-band client administration.
//!
//! Client creation, disabling and token issuance are operator actions, kept
//! off the tool surface on purpose. Secrets print exactly once.

use anyhow::{bail, Result};
use visage_crypto::{ClientRegistry, RsaKeyPair, TokenAuthority};
use visage_server::config::Config;

fn print_help() {
    eprintln!(
        r#"visage-admin - OAuth client administration for visage-server

USAGE:
    visage-admin create-client <name>
    visage-admin list-clients
    visage-admin disable-client <client_id>
    visage-admin issue-token <client_id> <client_secret>

Respects the same VISAGE_* environment variables as visage-server.
"#
    );
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::from_env()?;

    let registry = ClientRegistry::open(config.clients_file.clone())?;

    match args.first().map(String::as_str) {
        Some("create-client") => {
            let Some(name) = args.get(1) else {
                bail!("create-client requires a name");
            };
            let creds = registry.create_client(name)?;
            println!("client_id:     {}", creds.client_id);
            println!("client_secret: {}", creds.client_secret.as_str());
            println!();
            println!("Store the secret now; it cannot be recovered.");
        }
        Some("list-clients") => {
            let clients = registry.list_clients()?;
            if clients.is_empty() {
                println!("No clients registered.");
            }
            for client in clients {
                println!(
                    "{}  {}  enabled={}  created={}",
                    client.client_id, client.name, client.enabled, client.created_at
                );
            }
        }
        Some("disable-client") => {
            let Some(client_id) = args.get(1) else {
                bail!("disable-client requires a client_id");
            };
            registry.disable_client(client_id)?;
            println!("Disabled {}", client_id);
        }
        Some("issue-token") => {
            let (Some(client_id), Some(client_secret)) = (args.get(1), args.get(2)) else {
                bail!("issue-token requires a client_id and client_secret");
            };
            let keypair = RsaKeyPair::load_or_generate(&config.keys_dir)?;
            let authority = TokenAuthority::new(&keypair, registry, config.token_ttl_secs)?;
            let token = authority.issue_token(client_id, client_secret)?;
            println!("{}", token);
        }
        _ => {
            print_help();
            std::process::exit(2);
        }
    }

    Ok(())
}
