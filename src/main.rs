// Module declarations
mod cli;
mod config;
mod store;
mod template;
mod types;
mod update;
mod util;

// Re-export all module items at crate root so cross-module references work.
#[allow(unused_imports)]
pub(crate) use cli::*;
#[allow(unused_imports)]
pub(crate) use config::*;
#[allow(unused_imports)]
pub(crate) use store::*;
#[allow(unused_imports)]
pub(crate) use template::*;
#[allow(unused_imports)]
pub(crate) use types::*;
#[allow(unused_imports)]
pub(crate) use update::*;
#[allow(unused_imports)]
pub(crate) use util::*;

use std::cmp::Ordering;
use std::path::Path;

use clap::Parser;
use serde_json::json;

fn require_yes(yes: bool, action: &str) {
    if !yes {
        eprintln!("Refusing to {action} without --yes.");
        std::process::exit(2);
    }
}

fn open_sites(dir: &Path, base: &ConfigRepository) -> LayeredStore<SitesCollection> {
    LayeredStore::load_or_seed(
        dir.join(SITES_FILE),
        &normalize_defaults::<SitesCollection>(&base.doc.sites),
    )
}

fn open_prompts(dir: &Path, base: &ConfigRepository) -> LayeredStore<PromptsCollection> {
    LayeredStore::load_or_seed(
        dir.join(PROMPTS_FILE),
        &normalize_defaults::<PromptsCollection>(&base.doc.prompts),
    )
}

fn open_characters(dir: &Path, base: &ConfigRepository) -> LayeredStore<CharactersCollection> {
    LayeredStore::load_or_seed(
        dir.join(CHARACTERS_FILE),
        &normalize_defaults::<CharactersCollection>(&base.doc.characters),
    )
}

fn open_mail_sites(dir: &Path, base: &ConfigRepository) -> LayeredStore<MailSitesCollection> {
    LayeredStore::load_or_seed(
        dir.join(MAIL_SITES_FILE),
        &normalize_defaults::<MailSitesCollection>(&base.doc.mail_sites),
    )
}

fn find_prompt(store: &LayeredStore<PromptsCollection>, id: &str) -> Option<usize> {
    store.records().iter().position(|r| prompt_id(r) == id)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The helper runs in a bare process of its own: no pending-update check,
    // no config load, just the retry loop.
    if let Command::SwapHelper {
        install_dir,
        program_name,
        config_name,
    } = &cli.command
    {
        let paths = InstallPaths::new(install_dir, program_name, config_name);
        if !helper_loop(&paths, HELPER_MAX_ITERS, HELPER_INTERVAL) {
            eprintln!("Update swap did not complete; staged files left for next launch.");
            std::process::exit(1);
        }
        return Ok(());
    }

    let dir = resolve_install_dir(cli.dir.clone());
    let program_name = std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "splitshell".to_string());
    let paths = InstallPaths::new(&dir, &program_name, CONFIG_FILE);

    // Staged updates are resolved before anything reads the config document.
    match apply_pending_update(&paths) {
        ApplyOutcome::NoBundle => {}
        ApplyOutcome::Applied => println!("Update applied."),
        ApplyOutcome::DiscardedIncomplete => eprintln!("{}", ShellError::IncompleteBundle),
        ApplyOutcome::SwapDeferred => {
            spawn_swap_helper(&paths)?;
            println!("An update is finishing in the background; run again in a moment.");
            return Ok(());
        }
    }

    let mut base = ConfigRepository::load(&dir.join(CONFIG_FILE))?;
    let mut fill_cache = PlaceholderCache::default();

    match cli.command {
        Command::SwapHelper { .. } => unreachable!("handled above"),

        Command::Update {
            command:
                UpdateCommand::Check {
                    yes,
                    manifest_url,
                    payload_url,
                },
        } => {
            let manifest_url = manifest_url.as_deref().unwrap_or(REMOTE_MANIFEST_URL);
            let payload_url = payload_url.as_deref().unwrap_or(REMOTE_PAYLOAD_URL);
            let check = fetch_manifest(manifest_url)?;
            let local = base.doc.version.clone();
            match compare_versions(&check.remote_version, &local) {
                Ordering::Greater => {
                    println!("Update available: {local} -> {}", check.remote_version);
                    if yes {
                        stage_update(payload_url, &check.manifest, &paths)?;
                        println!("Update staged; it will be applied on the next launch.");
                    } else {
                        println!("Run again with --yes to download and stage it.");
                    }
                }
                _ => println!("Up to date (local {local}, remote {}).", check.remote_version),
            }
            Ok(())
        }

        Command::Sites { command } => {
            let mut store = open_sites(&dir, &base);
            match command {
                SitesCommand::List => {
                    for site in store.records() {
                        let tier = if site.free_tier { "" } else { " (paid)" };
                        println!("{:>3}  {}  {}  [{}]{tier}", site.id, site.name, site.url, site.category);
                    }
                }
                SitesCommand::Add { url } => {
                    let added = store.add_site(&url)?;
                    println!("Added #{} {} ({})", added.id, added.name, added.base);
                }
                SitesCommand::Remove { id } => match store.remove_site(id)? {
                    Some(removed) => println!("Removed all sites on base '{removed}'."),
                    None => {
                        eprintln!("No site with id {id}.");
                        std::process::exit(2);
                    }
                },
                SitesCommand::Restore { yes } => {
                    require_yes(yes, "replace the site list with the defaults");
                    store.restore_defaults(&normalize_defaults::<SitesCollection>(&base.doc.sites))?;
                    println!("Restored {} default sites.", store.records().len());
                }
                SitesCommand::Clear { yes } => {
                    require_yes(yes, "clear the site list");
                    store.clear()?;
                    println!("Site list cleared.");
                }
                SitesCommand::Import { file } => {
                    let count = store.import(&file)?;
                    println!("Imported {count} sites from {}.", file.display());
                }
                SitesCommand::Export { file } => {
                    store.export(&file)?;
                    println!("Exported {} sites to {}.", store.records().len(), file.display());
                }
            }
            Ok(())
        }

        Command::Prompts { command } => {
            let mut store = open_prompts(&dir, &base);
            match command {
                PromptsCommand::List { category } => {
                    for rec in store.records() {
                        if let Some(wanted) = &category {
                            if !rec.category.eq_ignore_ascii_case(wanted) {
                                continue;
                            }
                        }
                        let slots = count_slots(&rec.text);
                        let slots = if slots > 0 {
                            format!("  ({slots} slots)")
                        } else {
                            String::new()
                        };
                        println!("{}  [{}] {}{slots}", prompt_id(rec), rec.category, rec.title);
                    }
                }
                PromptsCommand::Categories => {
                    for cat in store.categories() {
                        println!("{cat}");
                    }
                }
                PromptsCommand::Show { id } => {
                    let Some(idx) = find_prompt(&store, &id) else {
                        eprintln!("No prompt with id {id}.");
                        std::process::exit(2);
                    };
                    let rec = &store.records()[idx];
                    println!("id:       {}", prompt_id(rec));
                    println!("title:    {}", rec.title);
                    println!("category: {}", rec.category);
                    if !rec.tags.is_empty() {
                        println!("tags:     {}", rec.tags.join(", "));
                    }
                    println!("slots:    {}", count_slots(&rec.text));
                    println!("{}", rec.text);
                }
                PromptsCommand::Add {
                    text,
                    title,
                    category,
                    tags,
                } => {
                    let added = store.add_prompt(title, category, tags, text)?;
                    println!("Added prompt {} '{}'.", prompt_id(&added), added.title);
                }
                PromptsCommand::Remove { id } => {
                    fill_cache.invalidate(&id);
                    let removed = store.remove(|r| prompt_id(r) == id)?;
                    if removed == 0 {
                        eprintln!("No prompt with id {id}.");
                        std::process::exit(2);
                    }
                    println!("Removed {removed} prompt(s).");
                }
                PromptsCommand::Edit {
                    id,
                    title,
                    category,
                    text,
                } => {
                    let Some(idx) = find_prompt(&store, &id) else {
                        eprintln!("No prompt with id {id}.");
                        std::process::exit(2);
                    };
                    // The old identity's cached fills no longer line up with
                    // the edited text, so they are dropped first.
                    fill_cache.invalidate(&id);
                    let mut rec = store.records()[idx].clone();
                    if let Some(title) = title {
                        rec.title = title;
                    }
                    if let Some(category) = category {
                        rec.category = category;
                    }
                    if let Some(text) = text {
                        rec.text = text.trim().to_string();
                    }
                    store.replace_at(idx, rec.clone())?;
                    println!("Prompt updated; id is now {}.", prompt_id(&rec));
                }
                PromptsCommand::Render {
                    id,
                    names,
                    no_names,
                    fills,
                } => {
                    let Some(idx) = find_prompt(&store, &id) else {
                        eprintln!("No prompt with id {id}.");
                        std::process::exit(2);
                    };
                    let rec = &store.records()[idx];
                    let pid = prompt_id(rec);
                    let rendered = render(rec, &names, &fill_cache, !no_names);
                    let text = if fills.is_empty() {
                        rendered.text
                    } else {
                        commit_fills(&pid, &rendered.text, &fills, &mut fill_cache)
                    };
                    let remaining = count_slots(&text);
                    println!("{text}");
                    if remaining > 0 {
                        eprintln!("{remaining} slot(s) still empty; pass --fill to complete them.");
                    }
                }
                PromptsCommand::Restore { yes } => {
                    require_yes(yes, "replace the prompt library with the defaults");
                    store.restore_defaults(&normalize_defaults::<PromptsCollection>(&base.doc.prompts))?;
                    println!("Restored {} default prompts.", store.records().len());
                }
                PromptsCommand::Clear { yes } => {
                    require_yes(yes, "clear the prompt library");
                    store.clear()?;
                    println!("Prompt library cleared.");
                }
                PromptsCommand::Import { file } => {
                    let count = store.import(&file)?;
                    println!("Imported {count} prompts from {}.", file.display());
                }
                PromptsCommand::Export { file } => {
                    store.export(&file)?;
                    println!("Exported {} prompts to {}.", store.records().len(), file.display());
                }
            }
            Ok(())
        }

        Command::Characters { command } => {
            let mut store = open_characters(&dir, &base);
            match command {
                CharactersCommand::List => {
                    for name in store.records() {
                        println!("{name}  [{}]", base.character_category(name));
                    }
                }
                CharactersCommand::Add { name } => match store.add_character(&name)? {
                    Some(name) => println!("Added '{name}'."),
                    None => println!("'{}' is already in the list.", sanitize_character_name(&name)),
                },
                CharactersCommand::Remove { name } => {
                    let wanted = name.to_lowercase();
                    let removed = store.remove(|n| n.to_lowercase() == wanted)?;
                    if removed == 0 {
                        eprintln!("No character named '{name}'.");
                        std::process::exit(2);
                    }
                    println!("Removed '{name}'.");
                }
                CharactersCommand::Restore { yes } => {
                    require_yes(yes, "replace the character list with the defaults");
                    store.restore_defaults(&normalize_defaults::<CharactersCollection>(
                        &base.doc.characters,
                    ))?;
                    println!("Restored {} default characters.", store.records().len());
                }
                CharactersCommand::Clear { yes } => {
                    require_yes(yes, "clear the character list");
                    store.clear()?;
                    println!("Character list cleared.");
                }
                CharactersCommand::Import { file } => {
                    let count = store.import(&file)?;
                    println!("Imported {count} characters from {}.", file.display());
                }
                CharactersCommand::Export { file } => {
                    store.export(&file)?;
                    println!("Exported {} characters to {}.", store.records().len(), file.display());
                }
            }
            Ok(())
        }

        Command::Mail { command } => {
            let mut store = open_mail_sites(&dir, &base);
            match command {
                MailCommand::List => {
                    for url in store.records() {
                        println!("{url}");
                    }
                }
                MailCommand::Add { url } => match store.add_mail_site(&url)? {
                    Some(url) => println!("Added {url}."),
                    None => println!("{} is already in the list.", ensure_scheme(&url)),
                },
                MailCommand::Remove { url } => {
                    let wanted = ensure_scheme(&url);
                    let removed = store.remove(|u| u == &wanted)?;
                    if removed == 0 {
                        eprintln!("No mail site {wanted}.");
                        std::process::exit(2);
                    }
                    println!("Removed {wanted}.");
                }
                MailCommand::Restore { yes } => {
                    require_yes(yes, "replace the mail site list with the defaults");
                    store.restore_defaults(&normalize_defaults::<MailSitesCollection>(
                        &base.doc.mail_sites,
                    ))?;
                    println!("Restored {} default mail sites.", store.records().len());
                }
                MailCommand::Clear { yes } => {
                    require_yes(yes, "clear the mail site list");
                    store.clear()?;
                    println!("Mail site list cleared.");
                }
                MailCommand::Import { file } => {
                    let count = store.import(&file)?;
                    println!("Imported {count} mail sites from {}.", file.display());
                }
                MailCommand::Export { file } => {
                    store.export(&file)?;
                    println!("Exported {} mail sites to {}.", store.records().len(), file.display());
                }
            }
            Ok(())
        }

        Command::Config { command } => {
            match command {
                ConfigCommand::Show => {
                    let doc = json!({
                        "version": base.doc.version,
                        "window": base.doc.window,
                        "ui": base.doc.ui,
                    });
                    println!("{}", serde_json::to_string_pretty(&doc)?);
                }
                ConfigCommand::Set {
                    width,
                    height,
                    fullscreen,
                    orientation,
                    pane_ratio,
                    window_title,
                    mail_url,
                    download_path,
                } => {
                    if let Some(width) = width {
                        base.doc.window.width = width;
                    }
                    if let Some(height) = height {
                        base.doc.window.height = height;
                    }
                    if let Some(fullscreen) = fullscreen {
                        base.doc.window.fullscreen = fullscreen;
                    }
                    if let Some(orientation) = orientation {
                        if orientation != "horizontal" && orientation != "vertical" {
                            eprintln!("Orientation must be 'horizontal' or 'vertical'.");
                            std::process::exit(2);
                        }
                        base.doc.window.orientation = orientation;
                    }
                    if let Some(ratio) = pane_ratio {
                        if !(0.0..=1.0).contains(&ratio) {
                            eprintln!("Pane ratio must be between 0.0 and 1.0.");
                            std::process::exit(2);
                        }
                        base.doc.window.pane_ratio = ratio;
                    }
                    if let Some(title) = window_title {
                        base.doc.window.window_title = title;
                    }
                    if let Some(url) = mail_url {
                        base.doc.window.mail_url = ensure_scheme(&url);
                    }
                    if let Some(path) = download_path {
                        base.doc.ui.download_path = path;
                    }
                    base.save()?;
                    println!("Configuration saved.");
                }
            }
            Ok(())
        }
    }
}
