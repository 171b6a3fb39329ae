//!
//! regctl
//! ------
//! Command-line access to a registry whose storage lives in a JSON snapshot file.
//! Configured mounts are reconciled on every start, so links survive between invocations.

use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};

use mountreg::config::RegistryConfig;
use mountreg::storage::{MemoryStorage, StorageEngine};
use mountreg::{Registry, RegistryContext, TenantId, SUPER_TENANT_ID};

const DEFAULT_STORE: &str = "registry.json";

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--store <file>] [--config <file>] [--tenant <id>] [--user <name>] <command> [args]\n\nCommands:\n  get <path>                     print a resource (content for files, children for collections)\n  put <path> [<content>|-]       store content (argument, or stdin with '-')\n  mkdir <path>                   create a collection\n  delete <path>                  delete a resource or a link\n  ls <path>                      list children\n  link <path> <target>           symbolic link to a local subtree\n  mount <path> <remote> <sub>    remote mount onto a configured instance\n  unlink <path>                  remove a link\n  tag <path> <tag>               apply a tag\n  tags <path>                    list tags\n  tagged <tag>                   paths carrying a tag\n  version <path>                 snapshot the current state\n  versions <path>                list versions\n  dump <path>                    write a subtree dump to stdout\n  restore <path> <file>          restore a dump under <path>\n  mounts                         list live mounts\n  whoami                         show the session context\n\nFlags:\n  --store <file>    snapshot file (env: MOUNTREG_STORE, default {DEFAULT_STORE})\n  --config <file>   registry configuration (env: MOUNTREG_CONFIG)\n  --tenant <id>     tenant id (default {SUPER_TENANT_ID})\n  --user <name>     acting user (default: OS user)\n  -h, --help        show this help"
    );
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> Result<Option<String>> {
    let Some(i) = args.iter().position(|a| a == flag) else { return Ok(None) };
    if i + 1 >= args.len() {
        bail!("{flag} needs a value");
    }
    let value = args.remove(i + 1);
    args.remove(i);
    Ok(Some(value))
}

fn arg<'a>(rest: &'a [String], i: usize, what: &str) -> Result<&'a str> {
    rest.get(i).map(String::as_str).ok_or_else(|| anyhow!("missing <{what}>"))
}

fn run(registry: &Registry, command: &str, rest: &[String]) -> Result<()> {
    let out = io::stdout();
    let mut out = out.lock();
    match command {
        "get" => {
            let r = registry.get(arg(rest, 0, "path")?)?;
            if r.collection {
                for c in &r.children {
                    writeln!(out, "{c}")?;
                }
            } else if let Some(bytes) = &r.content {
                out.write_all(bytes)?;
                if !bytes.ends_with(b"\n") {
                    writeln!(out)?;
                }
            }
        }
        "put" => {
            let path = arg(rest, 0, "path")?;
            let content = match rest.get(1).map(String::as_str) {
                None | Some("-") => {
                    let mut buf = Vec::new();
                    io::stdin().read_to_end(&mut buf)?;
                    buf
                }
                Some(text) => text.as_bytes().to_vec(),
            };
            let stored = registry.put(path, registry.new_resource().with_content(content))?;
            writeln!(out, "{stored}")?;
        }
        "mkdir" => {
            let stored = registry.put(arg(rest, 0, "path")?, registry.new_collection())?;
            writeln!(out, "{stored}")?;
        }
        "delete" => registry.delete(arg(rest, 0, "path")?)?,
        "ls" => {
            let r = registry.get(rest.first().map(String::as_str).unwrap_or("/"))?;
            for c in &r.children {
                writeln!(out, "{c}")?;
            }
        }
        "link" => registry.create_link(arg(rest, 0, "path")?, arg(rest, 1, "target")?)?,
        "mount" => registry.create_remote_link(arg(rest, 0, "path")?, arg(rest, 1, "remote")?, arg(rest, 2, "sub")?)?,
        "unlink" => registry.remove_link(arg(rest, 0, "path")?)?,
        "tag" => registry.apply_tag(arg(rest, 0, "path")?, arg(rest, 1, "tag")?)?,
        "tags" => {
            for t in registry.tags(arg(rest, 0, "path")?)? {
                writeln!(out, "{}\t{}", t.name, t.count)?;
            }
        }
        "tagged" => {
            for p in registry.paths_with_tag(arg(rest, 0, "tag")?)? {
                writeln!(out, "{p}")?;
            }
        }
        "version" => writeln!(out, "{}", registry.create_version(arg(rest, 0, "path")?)?)?,
        "versions" => {
            for v in registry.versions(arg(rest, 0, "path")?)? {
                writeln!(out, "{v}")?;
            }
        }
        "dump" => out.write_all(&registry.dump(arg(rest, 0, "path")?)?)?,
        "restore" => {
            let file = arg(rest, 1, "file")?;
            let bytes = fs::read(file).with_context(|| format!("reading dump '{file}'"))?;
            registry.restore(arg(rest, 0, "path")?, bytes)?;
        }
        "mounts" => {
            for m in registry.context().mounts().active(registry.tenant_id()) {
                writeln!(out, "{}\t{:?}\t{}", m.path, m.target, m.author)?;
            }
        }
        "whoami" => {
            let info = registry.registry_context()?;
            writeln!(out, "{}", serde_json::to_string_pretty(&info)?)?;
        }
        other => bail!("unknown command '{other}'"),
    }
    Ok(())
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .try_init();

    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage(&program);
        return Ok(());
    }

    let store = take_flag(&mut args, "--store")?
        .or_else(|| env::var("MOUNTREG_STORE").ok())
        .unwrap_or_else(|| DEFAULT_STORE.to_string());
    let mut config = match take_flag(&mut args, "--config")? {
        Some(path) => RegistryConfig::load(&path).with_context(|| format!("loading config '{path}'"))?,
        None => RegistryConfig::from_env()?,
    };
    config.apply_env();
    let tenant: TenantId = match take_flag(&mut args, "--tenant")? {
        Some(t) => t.parse().with_context(|| format!("invalid tenant id '{t}'"))?,
        None => SUPER_TENANT_ID,
    };
    let user = take_flag(&mut args, "--user")?.unwrap_or_else(whoami::username);

    let Some((command, rest)) = args.split_first() else {
        print_usage(&program);
        return Ok(());
    };

    let storage = Arc::new(MemoryStorage::open(&store).with_context(|| format!("opening store '{store}'"))?);
    let context = RegistryContext::new(config, storage.clone() as Arc<dyn StorageEngine>);
    let registry = context.registry(tenant, &user)?;
    let outcome = run(&registry, command, rest);
    context.shutdown()?;
    outcome
}
