//! Detail panel for the selected cell: thumbnail, score, voting and the
//! claim form for empty cells.

use std::collections::HashMap;

use gloo_storage::Storage;
use leptos::prelude::*;
use serde::{Deserialize, Serialize};
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use tilewall_shared::{Block, BlockStatus, ScoreDelta, ScoreIntent, VideoRef};

use crate::app::SharedImages;
use crate::canvas::render_scale;
use crate::controller::CanvasController;
use crate::image_cache::DecodedImage;
use crate::intents;
use crate::store::BlockStore;
use crate::web_image::WebImage;

const VOTES_KEY: &str = "tilewall.votes";
const THUMB_W: f64 = 224.0;
const THUMB_H: f64 = 126.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Like,
    Dislike,
}

/// Deltas to send when `pressed` is clicked while `current` is the standing
/// vote, and the vote that stands afterwards. Clicking the standing vote
/// withdraws it; switching sides withdraws the old one first.
pub fn vote_deltas(current: Option<Vote>, pressed: Vote) -> (Vec<ScoreDelta>, Option<Vote>) {
    match (current, pressed) {
        (Some(Vote::Like), Vote::Like) => (vec![ScoreDelta::Unlike], None),
        (Some(Vote::Dislike), Vote::Dislike) => (vec![ScoreDelta::Undislike], None),
        (Some(Vote::Dislike), Vote::Like) => {
            (vec![ScoreDelta::Undislike, ScoreDelta::Like], Some(Vote::Like))
        }
        (Some(Vote::Like), Vote::Dislike) => {
            (vec![ScoreDelta::Unlike, ScoreDelta::Dislike], Some(Vote::Dislike))
        }
        (None, Vote::Like) => (vec![ScoreDelta::Like], Some(Vote::Like)),
        (None, Vote::Dislike) => (vec![ScoreDelta::Dislike], Some(Vote::Dislike)),
    }
}

/// Votes follow the video, not the cell, since rebalances move blocks.
fn vote_key(video: &VideoRef) -> String {
    format!("{}:{}", video.platform.as_str(), video.video_id)
}

/// Source rectangle `(sx, sy, sw, sh)` that covers a `dst_aspect` frame
/// from a `src_w x src_h` image without stretching.
fn cover_rect(src_w: f64, src_h: f64, dst_aspect: f64) -> (f64, f64, f64, f64) {
    if src_w <= 0.0 || src_h <= 0.0 || dst_aspect <= 0.0 {
        return (0.0, 0.0, src_w.max(0.0), src_h.max(0.0));
    }
    let src_aspect = src_w / src_h;
    if src_aspect > dst_aspect {
        let sw = src_h * dst_aspect;
        ((src_w - sw) / 2.0, 0.0, sw, src_h)
    } else {
        let sh = src_w / dst_aspect;
        (0.0, (src_h - sh) / 2.0, src_w, sh)
    }
}

fn thumb_context(canvas: &HtmlCanvasElement) -> Option<CanvasRenderingContext2d> {
    let scale = render_scale();
    let w = (THUMB_W * scale) as u32;
    let h = (THUMB_H * scale) as u32;
    if canvas.width() != w || canvas.height() != h {
        canvas.set_width(w);
        canvas.set_height(h);
    }
    let ctx = canvas
        .get_context("2d")
        .ok()??
        .dyn_into::<CanvasRenderingContext2d>()
        .ok()?;
    ctx.set_transform(scale, 0.0, 0.0, scale, 0.0, 0.0).ok();
    Some(ctx)
}

fn clear_thumbnail(canvas: &HtmlCanvasElement) {
    if let Some(ctx) = thumb_context(canvas) {
        ctx.set_fill_style_str("#111114");
        ctx.fill_rect(0.0, 0.0, THUMB_W, THUMB_H);
    }
}

fn draw_thumbnail(canvas: &HtmlCanvasElement, image: &WebImage) {
    let Some(ctx) = thumb_context(canvas) else {
        return;
    };
    let (sx, sy, sw, sh) = cover_rect(image.width() as f64, image.height() as f64, THUMB_W / THUMB_H);
    ctx.draw_image_with_image_bitmap_and_sw_and_sh_and_dx_and_dy_and_dw_and_dh(
        image.bitmap(),
        sx,
        sy,
        sw,
        sh,
        0.0,
        0.0,
        THUMB_W,
        THUMB_H,
    )
    .ok();
}

fn status_label(block: Option<&Block>, is_ad_slot: bool) -> &'static str {
    match block.map(Block::status) {
        Some(BlockStatus::Claimed) => "Claimed",
        Some(BlockStatus::Ad) => "Sponsored",
        Some(BlockStatus::Empty) | None if is_ad_slot => "Reserved for ads",
        Some(BlockStatus::Empty) | None => "Empty",
    }
}

#[component]
pub fn BlockPreview() -> impl IntoView {
    let store: RwSignal<BlockStore> = expect_context();
    let controller: RwSignal<CanvasController> = expect_context();
    let SharedImages(images) = expect_context();
    let intents_url = StoredValue::new(controller.with_untracked(|c| c.config().intents_url.clone()));

    let votes: RwSignal<HashMap<String, Vote>> =
        RwSignal::new(gloo_storage::LocalStorage::get(VOTES_KEY).unwrap_or_default());
    Effect::new(move || {
        votes.with(|v| {
            let _ = gloo_storage::LocalStorage::set(VOTES_KEY, v);
        });
    });

    let selected = Memo::new(move |_| controller.with(|c| c.selected()));
    let claim_open = Memo::new(move |_| controller.with(|c| c.claim_target().is_some()));
    let block = Memo::new(move |_| {
        let pos = selected.get()?;
        store.with(|s| s.block_at(pos).cloned())
    });
    let is_ad_slot = Memo::new(move |_| {
        selected
            .get()
            .is_some_and(|pos| store.with(|s| s.ads().is_ad_slot(pos)))
    });

    let claim_url: RwSignal<String> = RwSignal::new(String::new());
    let claim_error: RwSignal<Option<String>> = RwSignal::new(None);
    let claim_sending: RwSignal<bool> = RwSignal::new(false);
    let vote_error: RwSignal<Option<String>> = RwSignal::new(None);

    // Thumbnail: from the shared cache, or loaded through it.
    let thumb_ref = NodeRef::<leptos::html::Canvas>::new();
    Effect::new(move || {
        let url = block.with(|b| b.as_ref().and_then(Block::thumbnail_url));
        let Some(canvas_el) = thumb_ref.get() else {
            return;
        };
        let canvas: &HtmlCanvasElement = &canvas_el;
        let canvas: HtmlCanvasElement = canvas.clone();
        clear_thumbnail(&canvas);
        let Some(url) = url else {
            return;
        };

        let mut ticket = None;
        images.update_value(|cache| ticket = Some(cache.load(&url)));
        let Some(ticket) = ticket else {
            return;
        };
        wasm_bindgen_futures::spawn_local(async move {
            let Some(image) = ticket.await else {
                return;
            };
            // The selection may have moved on while this was loading.
            let current = block.with_untracked(|b| b.as_ref().and_then(Block::thumbnail_url));
            if current.as_deref() == Some(url.as_str()) {
                draw_thumbnail(&canvas, &image);
            }
        });
    });

    let cast_vote = {
        let intents_url = intents_url.clone();
        move |pressed: Vote| {
            let Some(b) = block.get_untracked() else {
                return;
            };
            let Some(video) = b.video() else {
                return;
            };
            let key = vote_key(video);
            let current = votes.with_untracked(|v| v.get(&key).copied());
            let (deltas, next) = vote_deltas(current, pressed);
            votes.update(|v| match next {
                Some(vote) => {
                    v.insert(key, vote);
                }
                None => {
                    v.remove(&key);
                }
            });
            vote_error.set(None);

            let base = intents_url.get_value();
            let block_id = b.id;
            wasm_bindgen_futures::spawn_local(async move {
                for delta in deltas {
                    let intent = ScoreIntent { block_id, delta };
                    if let Err(err) = intents::send_score(&base, &intent).await {
                        tracing::warn!(block = block_id.0, error = %err, "score intent failed");
                        vote_error.set(Some(err.to_string()));
                        return;
                    }
                }
            });
        }
    };
    let cast_like = cast_vote.clone();
    let cast_dislike = cast_vote;

    let on_submit_claim = {
        let intents_url = intents_url.clone();
        move |_| {
            if claim_sending.get_untracked() {
                return;
            }
            let url = claim_url.get_untracked();
            let intent = controller.with_untracked(|c| store.with_untracked(|s| c.submit_claim(s, &url)));
            let intent = match intent {
                Ok(intent) => intent,
                Err(err) => {
                    claim_error.set(Some(err.to_string()));
                    return;
                }
            };
            claim_error.set(None);
            claim_sending.set(true);
            let base = intents_url.get_value();
            wasm_bindgen_futures::spawn_local(async move {
                match intents::send_claim(&base, &intent).await {
                    Ok(()) => {
                        claim_url.set(String::new());
                        controller.update(|c| c.close_claim());
                    }
                    Err(err) => {
                        tracing::warn!(block = intent.block_id.0, error = %err, "claim intent failed");
                        claim_error.set(Some(err.to_string()));
                    }
                }
                claim_sending.set(false);
            });
        }
    };

    let on_open_claim = move |_| {
        if let Some(pos) = selected.get_untracked() {
            claim_error.set(None);
            controller.update(|c| c.open_claim(pos));
        }
    };
    let on_cancel_claim = move |_| {
        claim_error.set(None);
        controller.update(|c| c.close_claim());
    };
    let on_close = move |_| {
        controller.update(|c| {
            c.close_claim();
            c.deselect();
        });
    };

    let current_vote = Memo::new(move |_| {
        let key = block.with(|b| b.as_ref().and_then(Block::video).map(vote_key))?;
        votes.with(|v| v.get(&key).copied())
    });
    let vote_style = move |vote: Vote| {
        let active = current_vote.get() == Some(vote);
        format!(
            "flex: 1; padding: 6px 0; border-radius: 4px; border: 1px solid #2a2a33; cursor: pointer; font-size: 0.8rem; {}",
            if active { "background: #8b5cf6; color: #fff;" } else { "background: #18181c; color: #c8c8d0;" }
        )
    };

    view! {
        <Show when=move || selected.get().is_some()>
            <div style="position: absolute; right: 16px; bottom: 16px; z-index: 6; width: 248px; padding: 12px; background: rgba(13,13,16,0.94); border: 1px solid #2a2a33; border-radius: 6px; color: #e4e4ea; font-family: 'Inter', system-ui, sans-serif; font-size: 0.82rem;">
                <div style="display: flex; justify-content: space-between; align-items: baseline; margin-bottom: 8px;">
                    <span style="font-family: 'JetBrains Mono', monospace; color: #8b8b96;">
                        {move || selected.get().map(|p| format!("({}, {})", p.col, p.row)).unwrap_or_default()}
                    </span>
                    <span style="color: #a78bfa;">
                        {move || block.with(|b| status_label(b.as_ref(), is_ad_slot.get()))}
                    </span>
                    <button style="background: none; border: none; color: #8b8b96; cursor: pointer;" on:click=on_close>"\u{2715}"</button>
                </div>
                <canvas
                    node_ref=thumb_ref
                    style=format!("display: block; width: {THUMB_W}px; height: {THUMB_H}px; border-radius: 4px; background: #111114;")
                />
                {move || {
                    let Some(b) = block.get() else {
                        return ().into_any();
                    };
                    let Some(claimed) = b.claimed().cloned() else {
                        return ().into_any();
                    };
                    let owner = claimed
                        .owner
                        .as_ref()
                        .map(|o| o.name.clone().unwrap_or_else(|| o.identity.clone()))
                        .unwrap_or_else(|| "anonymous".to_string());
                    let watch = claimed.video.watch_url();
                    view! {
                        <div style="margin-top: 8px; display: flex; flex-direction: column; gap: 4px;">
                            <div style="display: flex; justify-content: space-between;">
                                <span style="color: #8b8b96;">"Owner"</span>
                                <span>{owner}</span>
                            </div>
                            <div style="display: flex; justify-content: space-between; font-family: 'JetBrains Mono', monospace;">
                                <span style="color: #8b8b96;">"Score"</span>
                                <span>{format!("{} (+{} / -{})", b.net_score(), b.likes(), b.dislikes())}</span>
                            </div>
                            <a href=watch target="_blank" rel="noopener noreferrer" style="color: #a78bfa;">"Watch"</a>
                        </div>
                    }
                    .into_any()
                }}
                <Show when=move || block.with(|b| b.as_ref().is_some_and(|b| b.status() == BlockStatus::Claimed))>
                    <div style="display: flex; gap: 6px; margin-top: 8px;">
                        <button style=move || vote_style(Vote::Like) on:click={
                            let cast = cast_like.clone();
                            move |_| cast(Vote::Like)
                        }>"\u{25B2} Like"</button>
                        <button style=move || vote_style(Vote::Dislike) on:click={
                            let cast = cast_dislike.clone();
                            move |_| cast(Vote::Dislike)
                        }>"\u{25BC} Dislike"</button>
                    </div>
                    {move || vote_error.get().map(|e| view! { <div style="margin-top: 4px; color: #f87171;">{e}</div> })}
                </Show>
                <Show when=move || block.with(Option::is_none) && !is_ad_slot.get()>
                    <Show
                        when=move || claim_open.get()
                        fallback=move || view! {
                            <button
                                style="margin-top: 8px; width: 100%; padding: 6px 0; border-radius: 4px; border: 1px solid #8b5cf6; background: transparent; color: #c4b5fd; cursor: pointer;"
                                on:click=on_open_claim
                            >"Claim this cell"</button>
                        }
                    >
                        <div style="margin-top: 8px; display: flex; flex-direction: column; gap: 6px;">
                            <input
                                type="text"
                                placeholder="YouTube or TikTok URL"
                                style="padding: 6px 8px; background: #18181c; border: 1px solid #2a2a33; border-radius: 4px; color: #e4e4ea;"
                                prop:value=move || claim_url.get()
                                on:input=move |e| claim_url.set(event_target_value(&e))
                            />
                            <div style="display: flex; gap: 6px;">
                                <button
                                    style="flex: 1; padding: 6px 0; border-radius: 4px; border: none; background: #8b5cf6; color: #fff; cursor: pointer;"
                                    disabled=move || claim_sending.get()
                                    on:click=on_submit_claim.clone()
                                >{move || if claim_sending.get() { "Sending..." } else { "Claim" }}</button>
                                <button
                                    style="flex: 1; padding: 6px 0; border-radius: 4px; border: 1px solid #2a2a33; background: transparent; color: #c8c8d0; cursor: pointer;"
                                    on:click=on_cancel_claim
                                >"Cancel"</button>
                            </div>
                            {move || claim_error.get().map(|e| view! { <div style="color: #f87171;">{e}</div> })}
                        </div>
                    </Show>
                </Show>
            </div>
        </Show>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilewall_shared::Platform;

    #[test]
    fn voting_toggles_and_switches_sides() {
        assert_eq!(vote_deltas(None, Vote::Like), (vec![ScoreDelta::Like], Some(Vote::Like)));
        assert_eq!(vote_deltas(Some(Vote::Like), Vote::Like), (vec![ScoreDelta::Unlike], None));
        assert_eq!(
            vote_deltas(Some(Vote::Like), Vote::Dislike),
            (vec![ScoreDelta::Unlike, ScoreDelta::Dislike], Some(Vote::Dislike))
        );
        assert_eq!(
            vote_deltas(Some(Vote::Dislike), Vote::Dislike),
            (vec![ScoreDelta::Undislike], None)
        );
    }

    #[test]
    fn votes_are_keyed_by_video() {
        let video = VideoRef::new(Platform::TikTok, "7234567890123456789");
        assert_eq!(vote_key(&video), "tiktok:7234567890123456789");
    }

    #[test]
    fn cover_rect_crops_the_long_side() {
        // 4:3 into 16:9 trims top and bottom.
        let (sx, sy, sw, sh) = cover_rect(320.0, 240.0, 16.0 / 9.0);
        assert_eq!((sx, sw), (0.0, 320.0));
        assert!((sh - 180.0).abs() < 1e-9);
        assert!((sy - 30.0).abs() < 1e-9);

        // 16:9 into a square trims the sides.
        let (sx, _, sw, _) = cover_rect(1920.0, 1080.0, 1.0);
        assert!((sw - 1080.0).abs() < 1e-9);
        assert!((sx - 420.0).abs() < 1e-9);
    }

    #[test]
    fn empty_cells_say_whether_they_can_be_claimed() {
        assert_eq!(status_label(None, false), "Empty");
        assert_eq!(status_label(None, true), "Reserved for ads");
    }
}
