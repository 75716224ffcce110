use clap::Parser;
use krimeclient::client::KerberosClient;
use krimeclient::config::Config;
use krimeclient::error::KrbError;
use krimeclient::principal::Principal;
use krimeclient::{KerberosFlags, PrincipalNameType};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::{error, info};

#[derive(Debug, clap::Parser)]
#[clap(about = "Obtain an initial Kerberos ticket - A Krime, If You Please")]
struct OptParser {
    /// The client profile to load.
    #[clap(short, long, env = "KRB5_CONFIG", default_value = "/etc/krb5.conf")]
    config: PathBuf,
    /// Request a renewable ticket.
    #[clap(short, long)]
    renewable: bool,
    /// Request a forwardable ticket.
    #[clap(short, long)]
    forwardable: bool,
    /// The client principal, as name or name@REALM.
    principal: String,
}

fn krb_io_err(err: KrbError) -> io::Error {
    error!(?err);
    io::Error::other("kerberos exchange failed")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> io::Result<()> {
    let opt = OptParser::parse();

    tracing_subscriber::fmt::init();

    let config = Config::parse(&opt.config).map_err(krb_io_err)?;

    let client =
        Principal::parse(&opt.principal, PrincipalNameType::NtPrincipal).map_err(krb_io_err)?;

    print!("Password for {}: ", opt.principal);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    // Hand the buffer itself over; the exchange zeroes it when spent.
    let mut passphrase = line.into_bytes();
    while passphrase.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
        passphrase.pop();
    }

    let krb = KerberosClient::new(config);
    let mut exchange = krb.as_exchange(client, passphrase).map_err(krb_io_err)?;
    if opt.renewable {
        exchange = exchange.option(KerberosFlags::Renewable);
    }
    if opt.forwardable {
        exchange = exchange.option(KerberosFlags::Forwardable);
    }

    exchange.action(krb.transport()).await.map_err(krb_io_err)?;
    let creds = exchange.resolve().map_err(krb_io_err)?;

    info!("obtained ticket for {}", creds.client());
    info!("service: {}", creds.server());
    if let Ok(validity) = creds.end_time().duration_since(SystemTime::now()) {
        info!("valid for {} seconds", validity.as_secs());
    }
    if creds.is_renewable() {
        info!("renewable: yes");
    }

    Ok(())
}
