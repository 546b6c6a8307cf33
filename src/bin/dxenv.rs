//! dxenv: operational tooling for envelopes
//!
//! Usage:
//!   dxenv keygen
//!   dxenv pack --prekey <id> --signing-key <hex> --key <hex> [payload...]
//!   dxenv unpack --prekey <id> --peer-key <hex> --key <hex> [--skip-verify] [envelope]
//!   dxenv inspect [envelope]
//!
//! Envelopes are read from stdin when not given on the command line.

use std::io::{self, Read};
use std::process::ExitCode;

use dx_envelope::{
    cipher, keys, Lv, PrekeyBundle, SigningKeyPair, UnpackOptions, LENGTH_PREFIX_BYTES,
};

fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::from(1);
    }

    let result = match args[1].as_str() {
        "keygen" => cmd_keygen(&args[2..]),
        "pack" => cmd_pack(&args[2..]),
        "unpack" => cmd_unpack(&args[2..]),
        "inspect" => cmd_inspect(&args[2..]),
        "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        "--version" | "-V" => {
            println!("dxenv {}", dx_envelope::VERSION);
            Ok(())
        }
        cmd => {
            eprintln!("error: unknown command '{}'", cmd);
            print_usage();
            Err("unknown command".into())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let log_format = std::env::var("DX_LOG_FORMAT").unwrap_or_else(|_| "pretty".into());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dx_envelope=warn".into());
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .init();
    }
}

fn print_usage() {
    eprintln!(
        r#"dxenv: signed + encrypted LV envelopes

USAGE:
    dxenv <COMMAND> [OPTIONS]

COMMANDS:
    keygen      Print fresh handshake keys (public and secret) as JSON
    pack        Seal UTF-8 payload strings into a hex envelope
    unpack      Open a hex envelope and print its payload
    inspect     Show envelope structure (no decryption)

EXAMPLES:
    # Seal two payload LVs
    dxenv pack \
        --prekey 9f2c \
        --signing-key <ed25519 seed hex> \
        --key <32-byte AES key hex> \
        '{{"Content-Type":"application/json"}}' '{{"hello":"world"}}'

    # Open it again
    dxenv unpack \
        --prekey 9f2c \
        --peer-key <ed25519 public hex> \
        --key <32-byte AES key hex> \
        <envelope hex>

OPTIONS:
    -h, --help       Print help
    -V, --version    Print version
"#
    );
}

fn cmd_keygen(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = args.first() {
        return Err(format!("unknown option: {}", arg).into());
    }

    println!("{}", serde_json::to_string_pretty(&keygen_json())?);
    Ok(())
}

/// Fresh handshake keys with their secrets. `a0`/`a1`/`a2` are the public
/// halves a client sends to the prekey endpoint.
fn keygen_json() -> serde_json::Value {
    let signing = SigningKeyPair::generate();
    let ecdh_1 = keys::EcdhKeyPair::generate();
    let ecdh_2 = keys::EcdhKeyPair::generate();

    let seed = signing.to_bytes();
    let secret_1 = ecdh_1.secret_bytes();
    let secret_2 = ecdh_2.secret_bytes();
    let request = PrekeyBundle::from_parts(signing, ecdh_1, ecdh_2).request();

    serde_json::json!({
        "signing_seed": hex::encode(&seed[..]),
        "a1_secret": hex::encode(&secret_1[..]),
        "a2_secret": hex::encode(&secret_2[..]),
        "a0": request.a0,
        "a1": request.a1,
        "a2": request.a2,
    })
}

/// Options shared by `pack` and `unpack`.
#[derive(Default)]
struct EnvelopeArgs {
    prekey: Option<String>,
    signing_key: Option<String>,
    peer_key: Option<String>,
    key: Option<String>,
    skip_verify: bool,
    positional: Vec<String>,
}

fn parse_envelope_args(args: &[String]) -> Result<EnvelopeArgs, Box<dyn std::error::Error>> {
    let mut out = EnvelopeArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--prekey" | "-p" => {
                i += 1;
                out.prekey = Some(args.get(i).ok_or("missing prekey id")?.clone());
            }
            "--signing-key" | "-s" => {
                i += 1;
                out.signing_key = Some(args.get(i).ok_or("missing signing key")?.clone());
            }
            "--peer-key" | "-P" => {
                i += 1;
                out.peer_key = Some(args.get(i).ok_or("missing peer key")?.clone());
            }
            "--key" | "-k" => {
                i += 1;
                out.key = Some(args.get(i).ok_or("missing key")?.clone());
            }
            "--skip-verify" => out.skip_verify = true,
            flag if flag.starts_with("--") => return Err(format!("unknown option: {}", flag).into()),
            value => out.positional.push(value.to_string()),
        }
        i += 1;
    }
    Ok(out)
}

fn cmd_pack(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_envelope_args(args)?;
    let prekey = args.prekey.ok_or("missing --prekey")?;
    let signing = SigningKeyPair::from_bytes(&hex::decode(args.signing_key.ok_or("missing --signing-key")?)?)?;
    let key = hex::decode(args.key.ok_or("missing --key")?)?;

    let payload: Vec<Lv> = args.positional.iter().map(|s| Lv::from_utf8(s)).collect();
    let envelope = dx_envelope::pack(&prekey, &signing, &key, &payload)?;

    println!("{}", envelope);
    Ok(())
}

fn cmd_unpack(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_envelope_args(args)?;
    let prekey = args.prekey.ok_or("missing --prekey")?;
    let peer_key = keys::verifying_key_from_hex(&args.peer_key.ok_or("missing --peer-key")?)?;
    let key = hex::decode(args.key.ok_or("missing --key")?)?;
    let envelope = read_envelope(args.positional.first())?;

    let opts = UnpackOptions {
        skip_verify: args.skip_verify,
        ..Default::default()
    };
    let payload = dx_envelope::unpack_with(&prekey, &peer_key, &key, &envelope, opts)?;

    for lv in &payload {
        println!("{}", lv.value_as_string());
    }
    Ok(())
}

fn cmd_inspect(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let envelope = read_envelope(args.first())?;
    let bytes = hex::decode(&envelope)?;
    let elements = Lv::unmarshal(&bytes)?.expand()?;

    println!("DX Envelope");
    println!("===========");
    println!("Total Size:      {} bytes", bytes.len());
    println!("Elements:        {}", elements.len());

    if let Some(ciphertext) = elements.first() {
        println!();
        println!("Ciphertext:      {} bytes (+{} prefix)", ciphertext.len(), LENGTH_PREFIX_BYTES);
        if ciphertext.len() >= cipher::IV_BYTES {
            println!("IV:              {}", hex::encode(&ciphertext.value()[..cipher::IV_BYTES]));
            println!(
                "Blocks:          {}",
                (ciphertext.len() - cipher::IV_BYTES) / cipher::BLOCK_BYTES
            );
        }
    }
    if let Some(signature) = elements.get(1) {
        println!("Signature:       {} bytes", signature.len());
    }
    if elements.len() != 2 {
        println!();
        println!("warning: expected 2 elements (ciphertext, signature)");
    }

    Ok(())
}

fn read_envelope(arg: Option<&String>) -> Result<String, Box<dyn std::error::Error>> {
    match arg {
        Some(text) => Ok(text.trim().to_string()),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf.trim().to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex32(v: &serde_json::Value) -> [u8; 32] {
        hex::decode(v.as_str().unwrap()).unwrap().try_into().unwrap()
    }

    #[test]
    fn keygen_secrets_match_public_keys() {
        let out = keygen_json();

        let signing = SigningKeyPair::from_bytes(&hex32(&out["signing_seed"])).unwrap();
        assert_eq!(signing.public_hex(), out["a0"]);

        let ecdh_1 = keys::EcdhKeyPair::from_secret_bytes(hex32(&out["a1_secret"]));
        let ecdh_2 = keys::EcdhKeyPair::from_secret_bytes(hex32(&out["a2_secret"]));
        assert_eq!(ecdh_1.public_hex(), out["a1"]);
        assert_eq!(ecdh_2.public_hex(), out["a2"]);
    }
}
