use chrono::{DateTime, Utc};
use leptos::prelude::*;

use tilewall_shared::BlockId;
use tilewall_shared::grid::GridPos;

use crate::controller::CanvasController;
use crate::feed::ConnectionStatus;
use crate::store::BlockStore;

fn format_count(val: u64) -> String {
    if val >= 1_000_000 {
        format!("{:.1}M", val as f64 / 1_000_000.0)
    } else if val >= 1_000 {
        format!("{:.1}k", val as f64 / 1_000.0)
    } else {
        format!("{val}")
    }
}

fn format_score(score: i64) -> String {
    if score < 0 {
        format!("-{}", format_count(score.unsigned_abs()))
    } else {
        format!("+{}", format_count(score as u64))
    }
}

/// Short relative age, falling back to a date after a month.
fn format_relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds();
    if secs < 60 {
        return "just now".to_string();
    }
    let mins = secs / 60;
    if mins < 60 {
        return format!("{mins}m ago");
    }
    let hours = secs / 3600;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    let days = secs / 86_400;
    if days < 7 {
        return format!("{days}d ago");
    }
    if days < 30 {
        return format!("{}w ago", days / 7);
    }
    then.format("%b %d, %Y").to_string()
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq)]
struct TopEntry {
    id: BlockId,
    pos: GridPos,
    label: String,
    score: i64,
    claimed_at: Option<DateTime<Utc>>,
}

fn top_entries(store: &BlockStore) -> Vec<TopEntry> {
    store
        .stats()
        .top
        .iter()
        .filter_map(|&(id, score)| {
            let block = store.get(id)?;
            let claimed = block.claimed()?;
            let label = claimed
                .owner
                .as_ref()
                .and_then(|o| o.name.clone())
                .unwrap_or_else(|| claimed.video.video_id.clone());
            Some(TopEntry {
                id,
                pos: block.pos,
                label,
                score,
                claimed_at: claimed.claimed_at,
            })
        })
        .collect()
}

#[component]
fn StatRow(label: &'static str, value: Signal<String>) -> impl IntoView {
    view! {
        <div style="display: flex; justify-content: space-between; font-family: 'JetBrains Mono', monospace; font-size: 0.78rem;">
            <span style="color: #6a6a74;">{label}</span>
            <span style="color: #e4e4ea;">{move || value.get()}</span>
        </div>
    }
}

#[component]
pub fn Sidebar() -> impl IntoView {
    let store: RwSignal<BlockStore> = expect_context();
    let controller: RwSignal<CanvasController> = expect_context();
    let connection: RwSignal<ConnectionStatus> = expect_context();

    let claimed = Signal::derive(move || store.with(|s| format_count(s.stats().claimed as u64)));
    let ads = Signal::derive(move || store.with(|s| format_count(s.stats().ads as u64)));
    let likes = Signal::derive(move || store.with(|s| format_count(s.stats().total_likes)));
    let dislikes = Signal::derive(move || store.with(|s| format_count(s.stats().total_dislikes)));
    let cells = Signal::derive(move || {
        controller.with(|c| format_count(c.dims().cell_count() as u64))
    });
    let leaderboard = Memo::new(move |_| store.with(top_entries));

    let dot_style = Memo::new(move |_| match connection.get() {
        ConnectionStatus::Live => {
            "width: 8px; height: 8px; border-radius: 50%; background: #50c878; box-shadow: 0 0 8px rgba(80,200,120,0.5);"
        }
        ConnectionStatus::Connecting | ConnectionStatus::Reconnecting => {
            "width: 8px; height: 8px; border-radius: 50%; background: #f5c542; box-shadow: 0 0 8px rgba(245,197,66,0.35); animation: pulse-dot 1.5s ease-in-out infinite;"
        }
    });
    let status_text = Memo::new(move |_| match connection.get() {
        ConnectionStatus::Live => "Live",
        ConnectionStatus::Connecting => "Connecting...",
        ConnectionStatus::Reconnecting => "Reconnecting...",
    });

    view! {
        <div style="position: absolute; top: 16px; left: 16px; z-index: 5; width: 232px; background: rgba(13,13,16,0.94); border: 1px solid #2a2a33; border-radius: 6px; color: #e4e4ea; font-family: 'Inter', system-ui, sans-serif;">
            <div style="padding: 12px 14px 8px; font-family: 'Silkscreen', monospace; font-size: 0.85rem; letter-spacing: 0.14em; color: #a78bfa;">"TILEWALL"</div>
            <div style="padding: 0 14px 10px; display: flex; flex-direction: column; gap: 3px;">
                <StatRow label="Cells" value=cells />
                <StatRow label="Claimed" value=claimed />
                <StatRow label="Sponsored" value=ads />
                <StatRow label="Likes" value=likes />
                <StatRow label="Dislikes" value=dislikes />
            </div>
            <div style="padding: 8px 14px 4px; border-top: 1px solid #2a2a33; font-family: 'Silkscreen', monospace; font-size: 0.7rem; letter-spacing: 0.14em; color: #6a6a74;">"Top"</div>
            <Show
                when=move || leaderboard.with(|l| !l.is_empty())
                fallback=|| view! {
                    <div style="padding: 6px 14px 12px; font-size: 0.75rem; color: #4a4a54;">"Nothing claimed yet"</div>
                }
            >
                <ul style="list-style: none; margin: 0; padding: 0 8px 8px;">
                    <For
                        each={move || leaderboard.get().into_iter().enumerate().collect::<Vec<_>>()}
                        key=|item| (item.0, item.1.id, item.1.score)
                        children=move |(rank, entry)| {
                            let pos = entry.pos;
                            let age = entry
                                .claimed_at
                                .map(|t| format_relative_time(t, Utc::now()))
                                .unwrap_or_default();
                            let on_click = move |_| {
                                controller.update(|c| {
                                    c.center_on_cell(pos);
                                    c.select(pos);
                                });
                            };
                            view! {
                                <li
                                    style="display: flex; align-items: baseline; gap: 6px; padding: 3px 6px; border-radius: 3px; cursor: pointer; font-size: 0.75rem;"
                                    on:click=on_click
                                >
                                    <span style="color: #4a4a54; min-width: 18px; font-family: 'JetBrains Mono', monospace;">{rank + 1}</span>
                                    <span style="flex: 1; overflow: hidden; text-overflow: ellipsis; white-space: nowrap;">{entry.label}</span>
                                    <span style="color: #4a4a54; font-size: 0.65rem;">{age}</span>
                                    <span style="color: #a78bfa; font-family: 'JetBrains Mono', monospace;">{format_score(entry.score)}</span>
                                </li>
                            }
                        }
                    />
                </ul>
            </Show>
            <div style="padding: 8px 14px; border-top: 1px solid #2a2a33; display: flex; align-items: center; justify-content: space-between; font-family: 'JetBrains Mono', monospace; font-size: 0.68rem; color: #6a6a74;">
                <div style="display: flex; align-items: center; gap: 6px;">
                    <div style=move || dot_style.get() />
                    <span>{move || status_text.get()}</span>
                </div>
                <div style="display: flex; gap: 6px;">
                    <button
                        style="background: none; border: 1px solid #2a2a33; border-radius: 999px; padding: 3px 8px; color: #8b8b96; cursor: pointer; font-size: 0.66rem;"
                        title="Center the grid (c)"
                        on:click=move |_| controller.update(|c| {
                            let center = c.dims().center();
                            c.center_on_cell(center);
                        })
                    >"Center"</button>
                    <button
                        style="background: none; border: 1px solid #2a2a33; border-radius: 999px; padding: 3px 8px; color: #8b8b96; cursor: pointer; font-size: 0.66rem;"
                        title="Show the whole grid (f)"
                        on:click=move |_| controller.update(|c| c.fit_grid())
                    >"Fit"</button>
                </div>
            </div>
        </div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tilewall_shared::{BlockEvent, BlockRow, GridDims};

    #[test]
    fn counts_abbreviate() {
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(12_340), "12.3k");
        assert_eq!(format_count(1_000_000), "1.0M");
        assert_eq!(format_score(-1500), "-1.5k");
        assert_eq!(format_score(0), "+0");
    }

    #[test]
    fn relative_times_step_through_units() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let ago = |secs: i64| format_relative_time(now - chrono::Duration::seconds(secs), now);
        assert_eq!(ago(30), "just now");
        assert_eq!(ago(5 * 60), "5m ago");
        assert_eq!(ago(3 * 3600), "3h ago");
        assert_eq!(ago(2 * 86_400), "2d ago");
        assert_eq!(ago(14 * 86_400), "2w ago");
        assert_eq!(ago(60 * 86_400), "Apr 02, 2024");
    }

    fn claimed_row(dims: &GridDims, col: i32, row: i32, video: &str, likes: u64) -> BlockRow {
        let id = dims.grid_to_id(GridPos::new(col, row)).unwrap();
        serde_json::from_value(serde_json::json!({
            "id": id.0, "x": col, "y": row, "status": "claimed",
            "video_id": video, "platform": "youtube", "likes": likes, "dislikes": 0
        }))
        .unwrap()
    }

    #[test]
    fn leaderboard_follows_store_stats() {
        let dims = GridDims::new(9, 9);
        let mut store = BlockStore::new(dims, 4, 0);
        let rows = vec![
            claimed_row(&dims, 4, 4, "aaaaaaaaaaa", 3),
            claimed_row(&dims, 5, 4, "bbbbbbbbbbb", 9),
        ];
        store.apply_event(BlockEvent::Snapshot { seq: 1, blocks: rows }, 0.0);
        store.flush();
        let top = top_entries(&store);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].label, "bbbbbbbbbbb");
        assert_eq!(top[0].score, 9);
        // The best block has been pulled into the center.
        assert_eq!(top[0].pos, dims.center());
        assert_eq!(top[1].score, 3);
    }
}
