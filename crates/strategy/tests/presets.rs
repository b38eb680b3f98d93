use common::Timeframe;
use strategy::{OrderKind, StrategyFileConfig, StrategyRegistry};

const PRESETS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/strategies.toml");

fn registry() -> StrategyRegistry {
    let file = StrategyFileConfig::load(PRESETS).expect("presets parse");
    StrategyRegistry::from_config(&file).expect("every preset builds")
}

#[test]
fn every_preset_builds() {
    let registry = registry();
    assert_eq!(registry.len(), 19);
    for s in registry.iter() {
        let settings = s.settings();
        assert!(settings.stoploss < 0.0, "{} has a non-negative stoploss", s.name());
    }
}

#[test]
fn ladder_presets_enable_position_adjustment() {
    let registry = registry();
    for name in ["goal_depth", "vidra_inj", "vidra_uni", "resistance_sol", "strategy_00_kava"] {
        let s = registry.get(name).unwrap_or_else(|| panic!("missing preset {name}"));
        assert!(s.settings().position_adjustment, "{name}");
        assert!(s.settings().use_custom_stoploss, "{name}");
    }
    assert!(!registry.get("strategy_00").unwrap().settings().position_adjustment);
}

#[test]
fn futures_presets_allow_shorts() {
    let registry = registry();
    for name in ["goal_depth_futures", "depth_rsi_futures_sui", "resistance_sol", "strategy_00_spell_leverage"] {
        assert!(registry.get(name).unwrap().settings().can_short, "{name}");
    }
    assert!(!registry.get("goal_depth").unwrap().settings().can_short);
}

#[test]
fn vidra_uni_requests_hourly_informative() {
    let registry = registry();
    let s = registry.get("vidra_uni").unwrap();
    let inf = s.informative();
    assert_eq!(inf.len(), 1);
    assert_eq!(inf[0].timeframe, Timeframe::from_secs(3_600).unwrap());
    assert_eq!(s.settings().timeframe.to_string(), "5m");
}

#[test]
fn trailing_presets_carry_trailing_settings() {
    let registry = registry();
    let atom = registry.get("strategy_00_sl_atom").unwrap();
    let trailing = atom.settings().trailing.expect("trailing configured");
    assert!(trailing.only_offset_is_reached);
    assert!((trailing.offset - 0.036).abs() < 1e-12);

    let cross = registry.get("cross_ema").unwrap();
    assert_eq!(cross.settings().roi_at(0), Some(50.0));
}

#[test]
fn preset_stoplosses_match_their_sources() {
    let registry = registry();
    let expected = [
        ("strategy_00", -0.02),
        ("strategy_00_sl", -0.05),
        ("strategy_00_sl_atom", -0.035),
        ("breakeven_y", -0.03),
        ("strategy_00_plus", -0.08),
        ("strategy_00_plus1", -0.08),
        ("strategy_00g_sol", -0.05),
        ("strategy_00_kava", -0.05),
        ("strategy_00_spell", -0.015),
        ("strategy_00_spell_leverage", -0.013),
        ("cross_ema", -0.04),
        ("goal_depth", -0.03),
        ("goal_depth_futures", -0.02),
        ("depth_rsi_sui", -0.02),
        ("depth_rsi_futures_sui", -0.03),
        ("vidra_inj", -0.04),
        ("vidra_uni", -0.1),
        ("vidra_sui_ema30", -0.1),
        ("resistance_sol", -0.02),
    ];
    for (name, stoploss) in expected {
        let s = registry.get(name).unwrap_or_else(|| panic!("missing preset {name}"));
        assert_eq!(s.settings().stoploss, stoploss, "{name}");
    }
}

#[test]
fn spell_presets_use_market_orders() {
    let registry = registry();
    for name in ["strategy_00_spell", "strategy_00_spell_leverage"] {
        let orders = registry.get(name).unwrap().settings().order_types;
        assert_eq!(orders.entry, OrderKind::Market, "{name}");
        assert_eq!(orders.exit, OrderKind::Market, "{name}");
    }
    let orders = registry.get("strategy_00").unwrap().settings().order_types;
    assert_eq!(orders.entry, OrderKind::Limit);
    assert_eq!(orders.stoploss, OrderKind::Market);
}
