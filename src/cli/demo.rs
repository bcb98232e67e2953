//! Scripted ordering walkthrough.
//!
//! Drives the session store and response cache the way the request layer
//! would, with a canned responder standing in for the upstream model.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::info;

use convostate::{
    spawn_sweeper, OrderContextUpdate, OrderItem, ResponseCache, Role, SessionStore, StateConfig,
};

const MODEL: &str = "qwen/qwen3-coder:free";
const MAX_TOKENS: u32 = 80;
const TEMPERATURE: f32 = 0.7;

/// Run the demo against fresh in-process state.
pub(crate) async fn cmd_demo(config: StateConfig, session: Option<String>) -> Result<()> {
    let sessions = Arc::new(SessionStore::new(config.session.clone()));
    let cache = ResponseCache::from_config(&config.cache);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_sweeper(Arc::clone(&sessions), shutdown_rx);

    let session_id = session.unwrap_or_else(SessionStore::new_session_id);
    println!("Session: {}", session_id);

    println!("\n1. Recording customer details");
    sessions.update_order_context(
        &session_id,
        OrderContextUpdate {
            customer_name: Some(Some("Ahmed Khan".into())),
            phone_number: Some(Some("+92-300-1234567".into())),
            delivery_address: Some(Some("House 123, Street 5, Gulberg III, Lahore".into())),
            delivery_preference: Some(Some("home_delivery".into())),
            payment_method: Some(Some("cash_on_delivery".into())),
            ..Default::default()
        },
    );

    println!("\n2. Chatting");
    let prompt = "Hi, can you tell me about your popular pizzas?";
    chat(&sessions, &cache, &config, &session_id, prompt);

    println!("\n3. Adding items");
    sessions.add_order_item(
        &session_id,
        OrderItem::new("Peri Peri Pizza", 1200.0)
            .with_size("Large")
            .with_quantity(1)
            .with_instructions("Extra spicy"),
    );
    let ctx = sessions.add_order_item(
        &session_id,
        OrderItem::new("BBQ Wings", 450.0)
            .with_size("Regular (6 pieces)")
            .with_quantity(1),
    );
    for (i, item) in ctx.items().iter().enumerate() {
        println!("   {}. {} - Rs. {:.2}", i + 1, item.name, item.price);
    }
    println!("   Total: Rs. {:.2}", ctx.total());

    println!("\n4. Removing the first item");
    let removed = sessions
        .remove_order_item(&session_id, 0)
        .with_context(|| "Failed to remove order item")?;
    let ctx = sessions.get_order_context(&session_id)?;
    println!("   Removed: {}", removed.name);
    println!("   Updated total: Rs. {:.2}", ctx.total());

    println!("\n5. Adding special instructions");
    sessions.update_order_context(
        &session_id,
        OrderContextUpdate {
            special_instructions: Some(Some("Call 5 minutes before delivery".into())),
            ..Default::default()
        },
    );

    println!("\n6. Repeating a question (served from cache)");
    chat(&sessions, &cache, &config, &session_id, prompt);

    println!("\n7. Session summary");
    let summary = sessions.get_summary(&session_id)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).with_context(|| "Failed to render summary")?
    );

    println!("\n8. Session isolation");
    let other = SessionStore::new_session_id();
    sessions.add_order_item(&other, OrderItem::new("Garlic Bread", 300.0));
    println!(
        "   {} total: Rs. {:.2}, {} total: Rs. {:.2}",
        short(&session_id),
        sessions.get_order_context(&session_id)?.total(),
        short(&other),
        sessions.get_order_context(&other)?.total(),
    );

    let session_stats = sessions.stats();
    let cache_stats = cache.stats();
    println!(
        "\nSessions: {} active, {} messages | Cache: {} entries, {} hits, {} misses",
        session_stats.active_sessions,
        session_stats.total_messages,
        cache_stats.entries,
        cache_stats.hits,
        cache_stats.misses,
    );

    let _ = shutdown_tx.send(true);
    sweeper.await.with_context(|| "Session sweeper task failed")?;
    Ok(())
}

/// One request-layer turn: cache lookup, canned upstream on miss, then record
/// both sides of the exchange.
fn chat(
    sessions: &SessionStore,
    cache: &ResponseCache,
    config: &StateConfig,
    session_id: &str,
    prompt: &str,
) {
    let key = ResponseCache::make_key(prompt, MODEL, MAX_TOKENS, TEMPERATURE);
    let cached = if config.cache.enabled {
        cache.get(&key)
    } else {
        None
    };

    let (reply, hit) = match cached {
        Some(reply) => (reply, true),
        None => {
            let history = sessions.recent_messages(session_id, config.session.history_window);
            let order = sessions
                .get_order_context(session_id)
                .ok()
                .and_then(|ctx| ctx.format_for_prompt());
            let reply = canned_reply(prompt, history.len(), order.as_deref());
            if config.cache.enabled {
                cache.set(key, reply.clone());
            }
            (reply, false)
        }
    };

    sessions.append_message(session_id, Role::User, prompt);
    sessions.append_message(session_id, Role::Assistant, reply.clone());
    info!(session_id = %session_id, cached = hit, "Chat turn recorded");
    println!("   > {}", prompt);
    println!(
        "   < {}{}",
        reply,
        if hit { " (cached)" } else { "" }
    );
}

fn canned_reply(prompt: &str, history_len: usize, order: Option<&str>) -> String {
    let context = match order {
        Some(order) => format!("{} order detail line(s)", order.lines().count()),
        None => "no order yet".to_string(),
    };
    format!(
        "Our Peri Peri Pizza is the favourite. ({} chars asked, {} prior messages, {})",
        prompt.len(),
        history_len,
        context
    )
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
