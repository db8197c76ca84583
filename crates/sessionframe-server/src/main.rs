//! Sessionframe operator CLI.
//!
//! # Usage
//!
//! ```bash
//! # Derive a subkey from a session key
//! sessionframe derive --key 000102...1f --nonce a0a1...af --generation 2
//!
//! # Run a negotiation against an in-process issuer and authenticate the result
//! sessionframe negotiate --entropy combined --legs 2
//!
//! # Negotiate a cookie-mode context, then inspect the cookie
//! sessionframe negotiate --cookie-mode --cookie-key <64 hex chars>
//! sessionframe inspect-cookie --cookie-key <hex> --cookie <hex> --context-id urn:uuid:...
//! ```
//!
//! Derived keys and issued cookies are the commands' results and go to
//! stdout. Everything else goes through `tracing`; raise `--log-level` to
//! `debug` to follow each negotiation leg.

use std::{
    io::{self, Write},
    time::Duration,
};

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use sessionframe_core::{
    AlgorithmSuite, Claim, ClaimSet, ContextCookieCodec, ContextId, ContextReference,
    CookieExpectation, EntropyMode, Environment, IssuerConfig, KeyGeneration, KeyKind,
    NegotiationConfig, NegotiationProfile, SecurityContext, XChaChaCookieProtector,
};
use sessionframe_crypto::{COOKIE_KEY_SIZE, DerivedKey, DerivedKeyParams};
use sessionframe_server::{Node, NodeConfig, NodeError, SystemEnv};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Sessionframe security context tooling
#[derive(Parser, Debug)]
#[command(name = "sessionframe")]
#[command(about = "Negotiate, inspect and derive from security contexts")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Derive a subkey from a session key with P_SHA1
    Derive(DeriveArgs),
    /// Negotiate a context with an in-process issuer
    Negotiate(NegotiateArgs),
    /// Decrypt and display a context cookie
    InspectCookie(InspectArgs),
}

#[derive(ClapArgs, Debug)]
struct DeriveArgs {
    /// Source key (hex)
    #[arg(long)]
    key: String,

    /// Nonce (hex)
    #[arg(long)]
    nonce: String,

    /// Label (UTF-8); defaults to the standard derivation label
    #[arg(long)]
    label: Option<String>,

    /// Derived key length in bytes
    #[arg(long, default_value_t = 32)]
    length: usize,

    /// Absolute keystream offset
    #[arg(long, conflicts_with = "generation", required_unless_present = "generation")]
    offset: Option<usize>,

    /// Key generation (offset = generation * length)
    #[arg(long)]
    generation: Option<u32>,
}

#[derive(ClapArgs, Debug)]
struct NegotiateArgs {
    /// Proof key kind
    #[arg(long, value_enum, default_value_t = KeyKindArg::Symmetric)]
    key_kind: KeyKindArg,

    /// Source of symmetric key material
    #[arg(long, value_enum, default_value_t = EntropyArg::Combined)]
    entropy: EntropyArg,

    /// Symmetric key size in bits
    #[arg(long, default_value_t = 256)]
    key_size: u32,

    /// Algorithm suite
    #[arg(long, value_enum, default_value_t = SuiteArg::Basic256)]
    suite: SuiteArg,

    /// Use the multi-leg profile with this many legs allowed
    #[arg(long)]
    legs: Option<u32>,

    /// Issue the context as a cookie instead of caching it
    #[arg(long)]
    cookie_mode: bool,

    /// Cookie key (hex, 32 bytes)
    #[arg(long)]
    cookie_key: Option<String>,

    /// Overall negotiation budget in seconds
    #[arg(long, default_value_t = 60)]
    budget_secs: u64,

    /// Subject name attached to the issued claims
    #[arg(long, default_value = "operator")]
    subject: String,
}

#[derive(ClapArgs, Debug)]
struct InspectArgs {
    /// Cookie key (hex, 32 bytes)
    #[arg(long)]
    cookie_key: String,

    /// Cookie blob (hex)
    #[arg(long)]
    cookie: String,

    /// Context id the cookie was issued under
    #[arg(long)]
    context_id: String,

    /// Key generation the cookie was issued under
    #[arg(long)]
    key_generation: Option<String>,

    /// Local id the cookie must carry
    #[arg(long)]
    local_id: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KeyKindArg {
    Symmetric,
    Asymmetric,
    Bearer,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EntropyArg {
    Client,
    Server,
    Combined,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SuiteArg {
    Basic128,
    Basic192,
    Basic256,
}

impl From<KeyKindArg> for KeyKind {
    fn from(arg: KeyKindArg) -> Self {
        match arg {
            KeyKindArg::Symmetric => Self::Symmetric,
            KeyKindArg::Asymmetric => Self::Asymmetric,
            KeyKindArg::Bearer => Self::Bearer,
        }
    }
}

impl From<EntropyArg> for EntropyMode {
    fn from(arg: EntropyArg) -> Self {
        match arg {
            EntropyArg::Client => Self::ClientOnly,
            EntropyArg::Server => Self::ServerOnly,
            EntropyArg::Combined => Self::Combined,
        }
    }
}

impl From<SuiteArg> for AlgorithmSuite {
    fn from(arg: SuiteArg) -> Self {
        match arg {
            SuiteArg::Basic128 => Self::Basic128,
            SuiteArg::Basic192 => Self::Basic192,
            SuiteArg::Basic256 => Self::Basic256,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    match args.command {
        Command::Derive(derive) => run_derive(&derive)?,
        Command::Negotiate(negotiate) => run_negotiate(negotiate).await?,
        Command::InspectCookie(inspect) => run_inspect(&inspect)?,
    }

    Ok(())
}

fn run_derive(args: &DeriveArgs) -> Result<(), Box<dyn std::error::Error>> {
    let derived = derive_key(args)?;
    emit(&hex::encode(derived.key()))?;
    Ok(())
}

/// Derive the requested key. Only its shape is logged.
fn derive_key(args: &DeriveArgs) -> Result<DerivedKey, NodeError> {
    let key = decode_hex("key", &args.key)?;
    let mut params = DerivedKeyParams::builder(args.length).nonce(decode_hex("nonce", &args.nonce)?);
    if let Some(label) = &args.label {
        params = params.label(label.as_bytes());
    }
    if let Some(offset) = args.offset {
        params = params.offset(offset);
    }
    if let Some(generation) = args.generation {
        params = params.generation(generation);
    }

    let derived = DerivedKey::derive(&key, params.build()?)?;
    tracing::info!(
        length = derived.key().len(),
        offset = derived.params().effective_offset(),
        "derived key"
    );
    Ok(derived)
}

async fn run_negotiate(args: NegotiateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let profile = args.legs.map_or(NegotiationProfile::Default, |max_legs| {
        NegotiationProfile::MultiLeg { max_legs }
    });
    let suite = AlgorithmSuite::from(args.suite);
    let cookie_key = args.cookie_key.as_deref().map(parse_cookie_key).transpose()?;

    let node = Node::start(
        NodeConfig {
            issuer: IssuerConfig {
                algorithm_suite: suite,
                profile,
                cookie_mode: args.cookie_mode,
                ..IssuerConfig::default()
            },
            cookie_key,
            ..NodeConfig::default()
        },
        SystemEnv::new(),
    )?;

    let config = NegotiationConfig {
        key_kind: args.key_kind.into(),
        key_size_bits: args.key_size,
        entropy_mode: args.entropy.into(),
        algorithm_suite: suite,
        profile,
        audience: None,
    };
    let claims = vec![ClaimSet::new(
        "urn:sessionframe:cli",
        vec![Claim::new("name", args.subject)],
    )];

    let context = node.negotiate(config, claims, Duration::from_secs(args.budget_secs)).await?;
    log_context(&context);
    if let Some(cookie) = context.cookie_blob() {
        tracing::info!(len = cookie.len(), "cookie issued");
        emit(&hex::encode(cookie))?;
    }

    let evidence = node.authenticate(&ContextReference::for_context(&context))?;
    for set in evidence.claims.iter() {
        for claim in &set.claims {
            tracing::info!(
                issuer = %set.issuer,
                claim_type = %claim.claim_type,
                value = %claim.value,
                "authenticated claim"
            );
        }
    }
    Ok(())
}

fn run_inspect(args: &InspectArgs) -> Result<(), NodeError> {
    let env = SystemEnv::new();
    let codec = ContextCookieCodec::new(std::sync::Arc::new(XChaChaCookieProtector::new(
        parse_cookie_key(&args.cookie_key)?,
        env,
    )));
    let expected = CookieExpectation {
        context_id: ContextId::new(args.context_id.as_str()),
        key_generation: args.key_generation.as_deref().map(KeyGeneration::new),
        local_id: args.local_id.clone(),
    };

    let context = codec.decode(&decode_hex("cookie", &args.cookie)?, &expected)?;
    log_context(&context);
    tracing::info!(expired = context.is_expired(env.wall_clock()), "cookie decoded");
    Ok(())
}

fn log_context(context: &SecurityContext) {
    tracing::info!(
        context_id = %context.context_id(),
        key_generation = ?context.key_generation().map(KeyGeneration::as_str),
        key_kind = ?context.key_kind(),
        token_valid_from = %context.token_valid_from(),
        token_valid_to = %context.token_valid_to(),
        key_valid_to = %context.key_valid_to(),
        cookie_mode = context.is_cookie_mode(),
        "security context"
    );
}

/// Write one result line to stdout.
fn emit(line: &str) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, NodeError> {
    hex::decode(value).map_err(|err| NodeError::Config(format!("{field}: {err}")))
}

fn parse_cookie_key(value: &str) -> Result<[u8; COOKIE_KEY_SIZE], NodeError> {
    let bytes = decode_hex("cookie key", value)?;
    <[u8; COOKIE_KEY_SIZE]>::try_from(bytes.as_slice()).map_err(|_| {
        NodeError::Config(format!("cookie key must be {COOKIE_KEY_SIZE} bytes, got {}", bytes.len()))
    })
}
