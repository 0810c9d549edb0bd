//! Popover behaviour through the public API

use std::sync::Arc;

use contract_lens::analysis::{AnalysisRecord, SecurityInfo, SecurityStatus, TokenInfo};
use contract_lens::detect::NetworkTag;
use contract_lens::popover::{
    CloseReason, PopoverBody, PopoverController, PopoverEvent, PopoverState, Rect, Viewport,
};
use pretty_assertions::assert_eq;

const A: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
const B: &str = "0x8617E340B3D01FA5F11F306F4090FD50E238070D";

fn record(address: &str) -> Arc<AnalysisRecord> {
    let mut record = AnalysisRecord::new(address);
    record.token = Some(TokenInfo {
        name: Some("Bonk".into()),
        address: Some(address.into()),
        price: Some(0.000_021),
        market_cap: Some(1_450_000_000.0),
        bundlers: Some(0),
        ..TokenInfo::default()
    });
    record.security = Some(SecurityInfo {
        status: Some(SecurityStatus::Caution),
        score: Some(0.0),
        ..SecurityInfo::default()
    });
    Arc::new(record)
}

#[test]
fn test_hovering_b_while_a_is_open_leaves_one_popover_on_b() {
    let mut ctrl = PopoverController::default();
    let viewport = Viewport::new(1024.0, 768.0);

    ctrl.hover_enter(A, NetworkTag::Solana, Rect::new(20.0, 40.0, 90.0, 18.0), viewport);
    let b = ctrl.hover_enter(B, NetworkTag::Evm, Rect::new(300.0, 500.0, 90.0, 18.0), viewport);

    assert_eq!(ctrl.visible_count(), 1);
    let open = ctrl.current().unwrap();
    assert_eq!(open.id, b);
    assert_eq!(open.address, B);
    assert_eq!(open.placement.rect.left, 300.0);
    // 500 + 18 + 4 + 220 overflows 768, so it sits above the anchor
    assert!(open.placement.flipped);
    assert_eq!(open.placement.rect.top, 500.0 - 220.0 - 4.0);

    let closes = ctrl
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, PopoverEvent::Closed { reason: CloseReason::Replaced, .. }))
        .count();
    assert_eq!(closes, 1);
}

#[test]
fn test_refresh_renders_rows() {
    let mut ctrl = PopoverController::default();
    ctrl.hover_enter(A, NetworkTag::Solana, Rect::new(20.0, 40.0, 90.0, 18.0), Viewport::new(1024.0, 768.0));
    assert_eq!(ctrl.current().unwrap().view.body, PopoverBody::Loading);

    assert!(ctrl.analysis_ready(A, &record(A)));

    let view = &ctrl.current().unwrap().view;
    assert_eq!(view.network, "Solana");
    assert_eq!(view.short_address, "DezXAZ...pPB263");
    assert_eq!(view.row("Price"), Some("$0.000021"));
    assert_eq!(view.row("MCap"), Some("1450.0M"));
    assert_eq!(view.row("Bundlers"), Some("0"));
    assert_eq!(view.row("Security"), Some("caution (0)"));
    assert_eq!(
        view.buy_url.as_deref(),
        Some("https://dexscreener.com/search?q=DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263")
    );
}

#[test]
fn test_escape_then_late_result() {
    let mut ctrl = PopoverController::default();
    ctrl.hover_enter(B, NetworkTag::Evm, Rect::new(0.0, 0.0, 10.0, 10.0), Viewport::new(800.0, 600.0));
    assert!(ctrl.key("Escape"));

    assert!(!ctrl.analysis_ready(B, &record(B)));
    assert_eq!(ctrl.state(), &PopoverState::Closed);
}
