use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use credence_core::directory::DirectoryPolicy;
use credence_core::proxy::ProxyId;
use credence_core::registry::{Registry, RegistryConfig};
use credence_core::token::{Token, TokenError};
use credence_core::unit::UnitId;
use credence_core::RegistryError;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("state file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state file {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),
    #[error("token: {0}")]
    Token(#[from] TokenError),
}

/// Drive a Credence registry held in a JSON snapshot file.
#[derive(Parser)]
#[command(name = "credence", version, about)]
struct Cli {
    /// Path of the registry snapshot.
    #[arg(long, short = 's', default_value = "credence.json", global = true)]
    state: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a fresh registry snapshot.
    Init {
        /// Account allowed to mint the fee currency.
        #[arg(long)]
        issuer: String,
        /// Flat cost burned on registration.
        #[arg(long, default_value_t = 2)]
        cost: u64,
        /// Fee denominator applied to stake deposits.
        #[arg(long, default_value_t = 10)]
        fraction: u64,
        /// The registry's own escrow account.
        #[arg(long, default_value = "registry")]
        account: String,
        #[arg(long, default_value = "Credence Token")]
        token_name: String,
        #[arg(long, default_value = "CRD")]
        symbol: String,
        #[arg(long, default_value_t = 18)]
        decimals: u8,
    },
    /// Mint fee currency (token owner only).
    Mint {
        #[arg(long)]
        by: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
    },
    /// Grant a spender (the registry by default) an allowance.
    Approve {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        spender: Option<String>,
        #[arg(long)]
        amount: u64,
    },
    /// Show an account balance.
    Balance {
        #[arg(long)]
        account: String,
    },
    /// Create an unfrozen unit, optionally inheriting from a frozen parent.
    CreateUnit {
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        developer: String,
        #[arg(long)]
        parent: Option<UnitId>,
        /// Allow rebinding contract names until the unit freezes.
        #[arg(long)]
        overwrite: bool,
    },
    /// Bind a contract implementation in an unfrozen unit.
    AddImpl {
        #[arg(long)]
        unit: UnitId,
        #[arg(long)]
        by: String,
        #[arg(long)]
        contract: String,
        #[arg(long)]
        implementation: String,
    },
    /// Seal a unit's directory forever.
    Freeze {
        #[arg(long)]
        unit: UnitId,
        #[arg(long)]
        by: String,
    },
    /// Pay the registration cost and admit a frozen unit.
    Register {
        #[arg(long)]
        unit: UnitId,
        #[arg(long)]
        by: String,
    },
    /// Stake fee currency behind a registered unit.
    Stake {
        #[arg(long)]
        staker: String,
        #[arg(long)]
        unit: UnitId,
        #[arg(long)]
        amount: u64,
        #[arg(long)]
        memo: Option<String>,
    },
    /// Withdraw staked backing, fee-free.
    Unstake {
        #[arg(long)]
        staker: String,
        #[arg(long)]
        unit: UnitId,
        #[arg(long)]
        amount: u64,
        #[arg(long)]
        memo: Option<String>,
    },
    /// Move backing between registered units (the destination skim applies).
    TransferStake {
        #[arg(long)]
        staker: String,
        #[arg(long)]
        from: UnitId,
        #[arg(long)]
        to: UnitId,
        #[arg(long)]
        amount: u64,
        #[arg(long)]
        memo: Option<String>,
    },
    /// Resolve a contract implementation by coordinate.
    Resolve {
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        contract: String,
    },
    /// Show a registered unit.
    UnitInfo {
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: String,
    },
    /// Create a dispatch proxy for a resolvable coordinate.
    ProxyCreate {
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        contract: String,
    },
    /// Re-point a proxy at another version of its distribution.
    ProxyUpgrade {
        #[arg(long)]
        proxy: ProxyId,
        #[arg(long)]
        version: String,
    },
    /// Print the event log as JSON lines.
    Events {
        #[arg(long)]
        tail: Option<usize>,
    },
    /// Summarize the registry state.
    Status,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        process::exit(2);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let state = cli.state.as_path();
    match cli.command {
        Command::Init {
            issuer,
            cost,
            fraction,
            account,
            token_name,
            symbol,
            decimals,
        } => {
            let token = Token::new(token_name, symbol, decimals, issuer);
            let config = RegistryConfig {
                registration_cost: cost,
                developer_fraction: fraction,
                account,
            };
            let registry = Registry::new(config, token)?;
            save(state, &registry)?;
            println!(
                "Initialized registry at {} (cost {cost}, fraction {fraction})",
                state.display()
            );
        }
        Command::Mint { by, to, amount } => {
            let mut registry = load(state)?;
            registry.token_mut().mint(&by, &to, amount)?;
            save(state, &registry)?;
            println!("Minted {amount} {} → {to}", registry.token().symbol());
        }
        Command::Approve {
            owner,
            spender,
            amount,
        } => {
            let mut registry = load(state)?;
            let spender = spender.unwrap_or_else(|| registry.config().account.clone());
            registry.token_mut().approve(&owner, &spender, amount);
            save(state, &registry)?;
            println!("Approved {spender} to move {amount} from {owner}");
        }
        Command::Balance { account } => {
            let registry = load(state)?;
            println!("{}", registry.token().balance_of(&account));
        }
        Command::CreateUnit {
            name,
            version,
            developer,
            parent,
            overwrite,
        } => {
            let mut registry = load(state)?;
            let policy = if overwrite {
                DirectoryPolicy::Overwrite
            } else {
                DirectoryPolicy::WriteOnce
            };
            let unit = registry.create_unit(&name, &version, &developer, parent, policy)?;
            save(state, &registry)?;
            println!("Created unit {unit}: {name} {version} (developer {developer})");
        }
        Command::AddImpl {
            unit,
            by,
            contract,
            implementation,
        } => {
            let mut registry = load(state)?;
            registry.set_implementation(unit, &by, &contract, implementation.clone())?;
            save(state, &registry)?;
            println!("Bound {contract} → {implementation} in unit {unit}");
        }
        Command::Freeze { unit, by } => {
            let mut registry = load(state)?;
            registry.freeze_unit(unit, &by)?;
            save(state, &registry)?;
            println!("Froze unit {unit}");
        }
        Command::Register { unit, by } => {
            let mut registry = load(state)?;
            registry.register(unit, &by)?;
            save(state, &registry)?;
            println!(
                "Registered unit {unit} (burned {})",
                registry.config().registration_cost
            );
        }
        Command::Stake {
            staker,
            unit,
            amount,
            memo,
        } => {
            let mut registry = load(state)?;
            let outcome = registry.stake(&staker, unit, amount, memo)?;
            save(state, &registry)?;
            println!(
                "Staked {} behind unit {unit} (fee {}, unit total {})",
                outcome.effective, outcome.fee, outcome.unit_total
            );
        }
        Command::Unstake {
            staker,
            unit,
            amount,
            memo,
        } => {
            let mut registry = load(state)?;
            let total = registry.unstake(&staker, unit, amount, memo)?;
            save(state, &registry)?;
            println!("Unstaked {amount} from unit {unit} (unit total {total})");
        }
        Command::TransferStake {
            staker,
            from,
            to,
            amount,
            memo,
        } => {
            let mut registry = load(state)?;
            let outcome = registry.transfer_stake(&staker, from, to, amount, memo)?;
            save(state, &registry)?;
            println!(
                "Moved {amount} from unit {from} to unit {to} (fee {}, credited {})",
                outcome.fee, outcome.effective
            );
        }
        Command::Resolve {
            name,
            version,
            contract,
        } => {
            let registry = load(state)?;
            match registry.implementation(&name, &version, &contract) {
                Some(implementation) => println!("{implementation}"),
                None => println!("(none)"),
            }
        }
        Command::UnitInfo { name, version } => {
            let registry = load(state)?;
            match registry.unit(&name, &version) {
                None => println!("No unit registered as {name} {version}"),
                Some(unit) => {
                    println!("Unit {}: {} {}", unit.id(), unit.name(), unit.version());
                    println!("  developer: {}", unit.developer());
                    println!("  frozen: {}", unit.is_frozen());
                    match unit.parent() {
                        Some(parent) => println!("  parent: unit {parent}"),
                        None => println!("  parent: (none)"),
                    }
                    println!("  digest: {}", unit.digest_hex());
                    println!("  staked: {}", registry.stakes().total_staked_for(unit.id()));
                    for (contract, implementation) in unit.directory().entries() {
                        println!("  {contract} → {implementation}");
                    }
                }
            }
        }
        Command::ProxyCreate {
            name,
            version,
            contract,
        } => {
            let mut registry = load(state)?;
            let proxy = registry.create_proxy(&name, &version, &contract)?;
            save(state, &registry)?;
            match registry.proxy_target(proxy) {
                Some(target) => println!("Proxy {proxy} → {target}"),
                None => println!("Proxy {proxy}"),
            }
        }
        Command::ProxyUpgrade { proxy, version } => {
            let mut registry = load(state)?;
            registry.upgrade_proxy(proxy, &version)?;
            save(state, &registry)?;
            match registry.proxy_target(proxy) {
                Some(target) => println!("Proxy {proxy} now at {version} → {target}"),
                None => println!("Proxy {proxy} now at {version}"),
            }
        }
        Command::Events { tail } => {
            let registry = load(state)?;
            let events = registry.events();
            let skip = tail
                .map(|tail| events.len().saturating_sub(tail))
                .unwrap_or(0);
            for event in &events[skip..] {
                println!("{}", serde_json::to_string(event)?);
            }
        }
        Command::Status => {
            let registry = load(state)?;
            let token = registry.token();
            println!(
                "Token: {} ({}) supply {}",
                token.name(),
                token.symbol(),
                token.total_supply()
            );
            println!(
                "Registry account: {} (escrow {})",
                registry.config().account,
                token.balance_of(&registry.config().account)
            );
            let registered = registry
                .units()
                .iter()
                .filter(|unit| registry.is_registered(unit.id()))
                .count();
            println!("Units: {} ({registered} registered)", registry.units().len());
            for unit in registry.units().iter() {
                let mark = if registry.is_registered(unit.id()) {
                    "registered"
                } else if unit.is_frozen() {
                    "frozen"
                } else {
                    "open"
                };
                println!(
                    "  [{}] {} {} ({mark}, staked {})",
                    unit.id(),
                    unit.name(),
                    unit.version(),
                    registry.stakes().total_staked_for(unit.id())
                );
            }
            println!("Total staked: {}", registry.stakes().total_staked());
            println!("Proxies: {}", registry.proxies().count());
            println!("State digest: {}", hex::encode(registry.state_digest()));
        }
    }
    Ok(())
}

fn load(path: &Path) -> Result<Registry, CliError> {
    let bytes = fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn save(path: &Path, registry: &Registry) -> Result<(), CliError> {
    let mut bytes = serde_json::to_vec_pretty(registry).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    bytes.push(b'\n');
    fs::write(path, bytes).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn publish_and_stake_round_trip_through_the_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("registry.json");
        let state_arg = state.to_str().unwrap();

        run(parse(&[
            "credence", "--state", state_arg, "init", "--issuer", "issuer",
        ]))
        .unwrap();
        run(parse(&[
            "credence", "--state", state_arg, "mint", "--by", "issuer", "--to", "dev",
            "--amount", "100",
        ]))
        .unwrap();
        run(parse(&[
            "credence", "--state", state_arg, "mint", "--by", "issuer", "--to", "alice",
            "--amount", "100",
        ]))
        .unwrap();
        run(parse(&[
            "credence",
            "--state",
            state_arg,
            "create-unit",
            "--name",
            "erc20",
            "--version",
            "1.0.0",
            "--developer",
            "dev",
        ]))
        .unwrap();
        run(parse(&[
            "credence",
            "--state",
            state_arg,
            "add-impl",
            "--unit",
            "0",
            "--by",
            "dev",
            "--contract",
            "Gateway",
            "--implementation",
            "impl-1",
        ]))
        .unwrap();
        run(parse(&[
            "credence", "--state", state_arg, "freeze", "--unit", "0", "--by", "dev",
        ]))
        .unwrap();
        run(parse(&[
            "credence", "--state", state_arg, "approve", "--owner", "dev", "--amount", "2",
        ]))
        .unwrap();
        run(parse(&[
            "credence", "--state", state_arg, "register", "--unit", "0", "--by", "dev",
        ]))
        .unwrap();
        run(parse(&[
            "credence", "--state", state_arg, "approve", "--owner", "alice", "--amount", "42",
        ]))
        .unwrap();
        run(parse(&[
            "credence", "--state", state_arg, "stake", "--staker", "alice", "--unit", "0",
            "--amount", "42", "--memo", "launch",
        ]))
        .unwrap();

        let registry = load(&state).unwrap();
        assert!(registry.is_registered(UnitId::new(0)));
        assert_eq!(registry.token().balance_of(&"alice".to_string()), 58);
        assert_eq!(registry.token().balance_of(&"registry".to_string()), 38);
        assert_eq!(registry.stakes().total_staked(), 38);
        assert_eq!(registry.events().len(), 5);
    }

    #[test]
    fn failed_operations_do_not_touch_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("registry.json");
        let state_arg = state.to_str().unwrap();

        run(parse(&[
            "credence", "--state", state_arg, "init", "--issuer", "issuer",
        ]))
        .unwrap();
        run(parse(&[
            "credence", "--state", state_arg, "mint", "--by", "issuer", "--to", "dev",
            "--amount", "10",
        ]))
        .unwrap();
        let before = load(&state).unwrap();

        let err = run(parse(&[
            "credence", "--state", state_arg, "stake", "--staker", "dev", "--unit", "0",
            "--amount", "10",
        ]))
        .unwrap_err();
        assert!(matches!(err, CliError::Registry(_)));
        assert_eq!(load(&state).unwrap(), before);
    }
}
