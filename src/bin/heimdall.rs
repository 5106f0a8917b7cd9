//! heimdall - resolve federation entity metadata from the command line
//!
//! Builds a dynamic resolver from the configuration file, bootstraps it
//! from the persistent cache (if one is configured), and answers a single
//! query.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use heimdall::config::Config;
use heimdall::criteria::{EndpointCriterion, EntityIdCriterion, EntityRoleCriterion, StartsWithLocationCriterion};
use heimdall::index::{ArtifactIndex, EndpointIndex};
use heimdall::persist::{FilesystemLoadSaveManager, LoadSaveManager};
use heimdall::resolver::default_key_generator;
use heimdall::source::{HttpOriginSource, RequestUrlBuilder, RetryingOriginSource};
use heimdall::{CriteriaSet, DynamicMetadataResolver, Endpoint, EndpointType, EntityDescriptor, RoleType};

const DEFAULT_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";

/// Heimdall CLI
#[derive(Parser)]
#[command(name = "heimdall")]
#[command(version = heimdall::PKG_VERSION)]
#[command(about = "Dynamic federation metadata resolver")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "HEIMDALL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve one or more entities by entity ID
    Resolve {
        /// Entity IDs to resolve
        #[arg(required = true)]
        entity_ids: Vec<String>,
        /// Print the descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find cached entities publishing an endpoint location
    Lookup {
        /// Endpoint location URL
        location: String,
        /// Role element name
        #[arg(long, default_value = "SPSSODescriptor")]
        role: RoleType,
        /// Endpoint element name
        #[arg(long, default_value = "AssertionConsumerService")]
        endpoint: EndpointType,
        /// Also match locations that the given URL starts with
        #[arg(long)]
        starts_with: bool,
    },

    /// Inspect the persistent cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Print the persistent cache key for an entity ID
    Key {
        entity_id: String,
    },

    /// Print version information
    Version,
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached entries
    List,
    /// Remove a cached entry by entity ID
    Remove {
        entity_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    // Commands that don't need a resolver
    match &args.command {
        Command::Version => {
            println!("heimdall {}", heimdall::version_string());
            return Ok(());
        }
        Command::Key { entity_id } => {
            let key = default_key_generator()(&EntityDescriptor::new(entity_id.as_str()))
                .ok_or("entity ID must not be blank")?;
            println!("{key}");
            return Ok(());
        }
        _ => {}
    }

    let config = Config::load(args.config.as_deref())?;
    let cache = open_persistent_cache(&config)?;

    match args.command {
        Command::Cache { action } => {
            let cache = cache.ok_or("no persistent_cache directory configured")?;
            match action {
                CacheAction::List => {
                    let mut count = 0;
                    for (key, descriptor) in cache.list_all()? {
                        let valid_until = descriptor
                            .valid_until
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "-".to_string());
                        println!("{key}  {}  valid_until={valid_until}", descriptor.entity_id);
                        count += 1;
                    }
                    println!("{count} cached entries");
                }
                CacheAction::Remove { entity_id } => {
                    let key = default_key_generator()(&EntityDescriptor::new(entity_id.as_str()))
                        .ok_or("entity ID must not be blank")?;
                    if cache.remove(&key)? {
                        println!("removed {key}");
                    } else {
                        println!("{entity_id} is not cached");
                    }
                }
            }
        }

        Command::Resolve { entity_ids, json } => {
            let resolver = build_resolver(&config, cache).await?;
            let mut resolved = Vec::new();
            for entity_id in &entity_ids {
                let criteria = CriteriaSet::new().with(EntityIdCriterion::new(entity_id.as_str()));
                let descriptors = resolver.resolve(&criteria).await?;
                if descriptors.is_empty() {
                    eprintln!("{entity_id}: not found");
                }
                resolved.extend(descriptors);
            }

            if json {
                let plain: Vec<&EntityDescriptor> = resolved.iter().map(|d| d.as_ref()).collect();
                println!("{}", serde_json::to_string_pretty(&plain)?);
            } else {
                for descriptor in &resolved {
                    print_descriptor(&resolver, descriptor).await;
                }
            }
            resolver.shutdown();
        }

        Command::Lookup {
            location,
            role,
            endpoint,
            starts_with,
        } => {
            if cache.is_none() {
                return Err("lookup answers from the persistent cache; configure persistent_cache".into());
            }
            let resolver = build_resolver(&config, cache).await?;
            let criteria = CriteriaSet::new()
                .with(EntityRoleCriterion(role))
                .with(EndpointCriterion(Endpoint::new(endpoint, DEFAULT_BINDING, location)))
                .with(StartsWithLocationCriterion(starts_with));
            let matched = resolver.resolve(&criteria).await?;
            for descriptor in &matched {
                println!("{}", descriptor.entity_id);
            }
            println!("{} matching entities", matched.len());
            resolver.shutdown();
        }

        // Handled above
        Command::Key { .. } | Command::Version => {}
    }

    Ok(())
}

fn open_persistent_cache(config: &Config) -> Result<Option<Arc<dyn LoadSaveManager>>, Box<dyn std::error::Error>> {
    let Some(persistent) = &config.persistent_cache else {
        return Ok(None);
    };
    let manager = FilesystemLoadSaveManager::new(persistent.directory.clone())?;
    Ok(Some(Arc::new(manager)))
}

async fn build_resolver(
    config: &Config,
    cache: Option<Arc<dyn LoadSaveManager>>,
) -> Result<DynamicMetadataResolver, Box<dyn std::error::Error>> {
    let url_builder = match &config.http.url_template {
        Some(template) => RequestUrlBuilder::Template(template.clone()),
        None => RequestUrlBuilder::EntityId,
    };
    let http = HttpOriginSource::with_timeout(url_builder, config.http.timeout())?
        .content_types(config.http.content_types.iter().cloned());
    let origin = RetryingOriginSource::new(Arc::new(http), config.http.retry.clone());

    // One-shot commands need the cache loaded before the query runs
    let resolver_config = config
        .resolver
        .clone()
        .initialize_from_persistent_cache_in_background(false);

    let mut builder = DynamicMetadataResolver::builder()
        .id("cli")
        .origin(Arc::new(origin))
        .index(Arc::new(EndpointIndex::new()))
        .index(Arc::new(ArtifactIndex::new()))
        .config(resolver_config);
    if let Some(cache) = cache {
        builder = builder.persistent_cache(cache);
    }
    Ok(builder.build().await?)
}

async fn print_descriptor(resolver: &DynamicMetadataResolver, descriptor: &EntityDescriptor) {
    println!("{}", descriptor.entity_id);
    if let Some(valid_until) = descriptor.valid_until {
        println!("  valid until:     {}", valid_until.to_rfc3339());
    }
    if let Some(tracker) = resolver.management_data(&descriptor.entity_id) {
        let lifecycle = tracker.lifecycle().await;
        println!("  expires:         {}", lifecycle.expiration.to_rfc3339());
        println!("  refresh after:   {}", lifecycle.refresh_trigger.to_rfc3339());
    }
    for role in &descriptor.roles {
        println!("  {}", role.role_type);
        for endpoint in &role.endpoints {
            println!("    {} {} ({})", endpoint.endpoint_type, endpoint.location, endpoint.binding);
        }
    }
}
