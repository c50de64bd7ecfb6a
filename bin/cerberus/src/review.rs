//! Interactive queue review.

use cb_core::error::AppError;
use cb_core::fitter::{fit_post, weighted_len};
use cb_core::models::ContentItem;
use cb_engine::Engine;
use colored::Colorize;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};

const DISPLAY_LIMIT: i64 = 50;

const MENU: [&str; 9] = [
    "Review pending posts",
    "Generate one post",
    "Generate a batch",
    "Write a post",
    "Edit a post",
    "Remove a post",
    "Show recent posts",
    "Run maintenance",
    "Exit",
];

fn section(title: &str) {
    println!();
    println!("{}", "=".repeat(50).bright_black());
    println!("{}", title.cyan().bold());
    println!("{}", "=".repeat(50).bright_black());
}

fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

fn warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message.yellow());
}

fn failure(message: &str) {
    println!("{} {}", "✗".red().bold(), message.red());
}

fn show_item(item: &ContentItem) {
    println!(
        "{} {} {}",
        format!("#{}", item.id).bold(),
        "|".bright_black(),
        item.status.to_string().cyan()
    );
    println!("{}", item.content);
}

pub async fn run(engine: &mut Engine, bulk_count: usize) -> anyhow::Result<()> {
    let theme = ColorfulTheme::default();
    loop {
        section("Cerberus review");
        let choice = Select::with_theme(&theme)
            .with_prompt("Choose an action")
            .default(0)
            .items(&MENU[..])
            .interact()?;

        let outcome = match choice {
            0 => review_pending(engine, &theme).await,
            1 => generate_one(engine, &theme).await,
            2 => generate_batch(engine, &theme, bulk_count).await,
            3 => write_post(engine, &theme).await,
            4 => edit_by_id(engine, &theme).await,
            5 => remove_by_id(engine, &theme).await,
            6 => show_recent(engine).await,
            7 => maintain(engine).await,
            _ => break,
        };

        if let Err(e) = outcome {
            if e.downcast_ref::<dialoguer::Error>().is_some() {
                return Err(e);
            }
            failure(&e.to_string());
        }
    }
    println!("{}", "Review session ended.".blue());
    Ok(())
}

async fn review_pending(engine: &Engine, theme: &ColorfulTheme) -> anyhow::Result<()> {
    let pending = engine.repo().list_pending().await?;
    if pending.is_empty() {
        warning("No pending posts to review.");
        return Ok(());
    }

    for item in pending {
        section(&format!("Post {}", item.id));
        show_item(&item);
        let action = Select::with_theme(theme)
            .with_prompt("Action")
            .default(0)
            .items(&["Authorize", "Remove", "Edit", "Skip"][..])
            .interact()?;

        let applied = match action {
            0 => engine.repo().authorize(item.id).await?,
            1 => engine.repo().remove(item.id).await?,
            2 => {
                edit_item(engine, theme, &item).await?;
                continue;
            }
            _ => {
                warning("Skipped.");
                continue;
            }
        };
        match (action, applied) {
            (0, true) => success("Authorized."),
            (_, true) => success("Removed."),
            _ => warning("The post changed state in the meantime."),
        }
    }
    Ok(())
}

async fn generate_one(engine: &mut Engine, theme: &ColorfulTheme) -> anyhow::Result<()> {
    println!("{}", "Generating a post...".blue());
    let post = engine.compose_post().await?;
    println!("{post}");

    if Confirm::with_theme(theme)
        .with_prompt("Queue this post?")
        .default(true)
        .interact()?
    {
        let id = engine.repo().insert(&post).await?;
        success(&format!("Queued as #{id}."));
    } else {
        warning("Discarded.");
    }
    Ok(())
}

async fn generate_batch(engine: &mut Engine, theme: &ColorfulTheme, count: usize) -> anyhow::Result<()> {
    println!("{}", format!("Generating {count} posts...").blue());
    let posts = engine.generate_batch(count).await;
    if posts.is_empty() {
        failure("No posts were generated.");
        return Ok(());
    }
    for (n, post) in posts.iter().enumerate() {
        println!("{} {}", format!("[{}]", n + 1).bright_black(), post);
    }

    if Confirm::with_theme(theme)
        .with_prompt(format!("Queue these {} posts?", posts.len()))
        .default(true)
        .interact()?
    {
        let stored = engine.store_batch(&posts).await?;
        success(&format!("{stored} posts queued."));
    } else {
        warning("Discarded.");
    }
    Ok(())
}

async fn write_post(engine: &Engine, theme: &ColorfulTheme) -> anyhow::Result<()> {
    let mut text: String = Input::with_theme(theme)
        .with_prompt("Post text")
        .interact_text()?;

    let limit = engine.options().max_post_length;
    if weighted_len(text.trim()) > limit {
        if !Confirm::with_theme(theme)
            .with_prompt(format!("Text exceeds {limit} characters. Shorten it?"))
            .default(true)
            .interact()?
        {
            warning("Not queued: the post would be rejected when published.");
            return Ok(());
        }
        text = fit_post(&text, &[], limit);
        println!("{text}");
    }

    let id = engine.queue_manual(&text).await?;
    success(&format!("Queued as #{id}."));
    Ok(())
}

/// Asks for an id; `c` cancels.
fn prompt_id(theme: &ColorfulTheme, prompt: &str) -> anyhow::Result<Option<i64>> {
    let raw: String = Input::with_theme(theme)
        .with_prompt(format!("{prompt} (or 'c' to cancel)"))
        .validate_with(|input: &String| -> Result<(), &str> {
            let input = input.trim();
            if input.eq_ignore_ascii_case("c") || input.parse::<i64>().is_ok() {
                Ok(())
            } else {
                Err("enter a numeric id or 'c'")
            }
        })
        .interact_text()?;

    Ok(raw.trim().parse().ok())
}

async fn find(engine: &Engine, id: i64) -> anyhow::Result<Option<ContentItem>> {
    match engine.item(id).await {
        Ok(item) => Ok(Some(item)),
        Err(AppError::NotFound { id }) => {
            failure(&format!("No post with id {id}."));
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

async fn edit_item(engine: &Engine, theme: &ColorfulTheme, item: &ContentItem) -> anyhow::Result<()> {
    if !item.status.is_editable() {
        warning("Posted items cannot be edited.");
        return Ok(());
    }
    let text: String = Input::with_theme(theme)
        .with_prompt("New text (empty keeps the current one)")
        .allow_empty(true)
        .interact_text()?;

    if text.trim().is_empty() {
        warning("No changes made.");
    } else if engine.repo().update_content(item.id, &text).await? {
        success("Post updated.");
    } else {
        warning("The post can no longer be edited.");
    }
    Ok(())
}

async fn edit_by_id(engine: &Engine, theme: &ColorfulTheme) -> anyhow::Result<()> {
    show_recent(engine).await?;
    let Some(id) = prompt_id(theme, "Id of the post to edit")? else {
        return Ok(());
    };
    if let Some(item) = find(engine, id).await? {
        section(&format!("Editing post {id}"));
        show_item(&item);
        edit_item(engine, theme, &item).await?;
    }
    Ok(())
}

async fn remove_by_id(engine: &Engine, theme: &ColorfulTheme) -> anyhow::Result<()> {
    show_recent(engine).await?;
    let Some(id) = prompt_id(theme, "Id of the post to remove")? else {
        return Ok(());
    };
    let Some(item) = find(engine, id).await? else {
        return Ok(());
    };

    section(&format!("Post {id}"));
    show_item(&item);
    if !Confirm::with_theme(theme)
        .with_prompt("Remove this post?")
        .default(false)
        .interact()?
    {
        warning("Removal cancelled.");
        return Ok(());
    }

    if engine.repo().remove(id).await? {
        success("Post removed.");
    } else {
        warning("Posted items are kept until retention removes them.");
    }
    Ok(())
}

async fn show_recent(engine: &Engine) -> anyhow::Result<()> {
    let items = engine.repo().list_recent(DISPLAY_LIMIT).await?;
    if items.is_empty() {
        warning("The queue is empty.");
        return Ok(());
    }
    section(&format!("Latest {} posts", items.len()));
    for item in &items {
        show_item(item);
        println!("{}", "-".repeat(50).bright_black());
    }
    Ok(())
}

async fn maintain(engine: &Engine) -> anyhow::Result<()> {
    println!("{}", "Running maintenance...".blue());
    let report = engine.maintain().await;
    if report.is_clean() {
        success(&format!(
            "Maintenance complete: {} expired, {} evicted.",
            report.expired, report.evicted
        ));
    } else {
        failure(&format!(
            "Maintenance finished with {} failed step(s); see the log.",
            report.failures
        ));
    }
    Ok(())
}
