use xics::{TriggerMode, Xics, XicsConfig, XicsError, DEFAULT_IRQ_OFFSET};

#[test]
fn config_parses_from_json_with_defaults() {
    let cfg: XicsConfig =
        serde_json::from_str(r#"{ "nr_servers": 2, "nr_irqs": 32, "lsi_irqs": [16, 17] }"#)
            .unwrap();
    assert_eq!(cfg.irq_offset, DEFAULT_IRQ_OFFSET);
    assert_eq!(cfg.irq_end(), 48);

    let (xics, latches) = Xics::with_latches(&cfg).unwrap();
    assert_eq!(latches.len(), 2);
    assert_eq!(xics.nr_servers(), 2);
    assert_eq!(xics.ics().irq(16).trigger, TriggerMode::Lsi);
    assert_eq!(xics.ics().irq(17).trigger, TriggerMode::Lsi);
    assert_eq!(xics.ics().irq(18).trigger, TriggerMode::Msi);
}

#[test]
fn config_round_trips_through_json() {
    let cfg = XicsConfig::new(4, 64).with_lsi(20);
    let json = serde_json::to_string(&cfg).unwrap();
    let back: XicsConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cfg);
}

#[test]
fn invalid_topology_is_refused_at_construction() {
    let cfg: XicsConfig =
        serde_json::from_str(r#"{ "nr_servers": 1, "nr_irqs": 8, "irq_offset": 1 }"#).unwrap();
    assert_eq!(
        Xics::with_latches(&cfg).unwrap_err(),
        XicsError::IrqOffsetTooLow(1)
    );

    let cfg = XicsConfig::new(1, 8).with_lsi(40);
    assert_eq!(
        Xics::with_latches(&cfg).unwrap_err(),
        XicsError::InvalidLsi(40)
    );
}

#[test]
fn board_wiring_can_switch_trigger_modes() {
    let (mut xics, _latches) = Xics::with_latches(&XicsConfig::new(1, 4)).unwrap();
    xics.set_irq_type(19, TriggerMode::Lsi);
    xics.reset();
    assert_eq!(xics.ics().irq(19).trigger, TriggerMode::Lsi);
}
