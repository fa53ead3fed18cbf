//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Localization table fetching against the mock dongle."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use rg_i18n::{I18nError, Language, Localizer, PropertiesLocalizer};
use rg_testharness::fixtures::EN_US_PROPERTIES;
use rg_testharness::MockDevice;

fn localizer(device: &MockDevice) -> PropertiesLocalizer {
    PropertiesLocalizer::from_device(&device.device_config(), &device.session_config()).unwrap()
}

#[tokio::test]
async fn tables_are_fetched_once_per_language() -> anyhow::Result<()> {
    let device = MockDevice::start().await?;
    device.set_translations("en_US", EN_US_PROPERTIES);
    let localizer = localizer(&device);

    let first = localizer
        .localize("I18N_COMMON_TOTAL_DCPOWER", Language::English)
        .await?;
    let second = localizer
        .localize("I18N_COMMON_MPPT_VOLTAGE%@2", Language::English)
        .await?;
    assert_eq!(first, "Total DC Power");
    assert_eq!(second, "MPPT2 Voltage");
    assert_eq!(device.i18n_fetches("en_US"), 1);
    assert_eq!(localizer.cached_languages().await, vec![Language::English]);

    device.shutdown().await
}

#[tokio::test]
async fn no_language_never_touches_the_device() -> anyhow::Result<()> {
    let device = MockDevice::start().await?;
    let localizer = localizer(&device);
    let code = localizer
        .localize("I18N_COMMON_TOTAL_DCPOWER", Language::None)
        .await?;
    assert_eq!(code, "I18N_COMMON_TOTAL_DCPOWER");
    assert_eq!(device.i18n_fetches("en_US"), 0);
    device.shutdown().await
}

#[tokio::test]
async fn malformed_table_is_not_cached_and_retried() -> anyhow::Result<()> {
    let device = MockDevice::start().await?;
    device.set_translations("de_DE", "I18N_A=Leistung\nkaputt\n");
    let localizer = localizer(&device);

    let err = localizer
        .localize("I18N_A", Language::German)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        I18nError::MalformedLine { line_number: 2, .. }
    ));
    assert!(localizer.cached_languages().await.is_empty());

    device.set_translations("de_DE", "I18N_A=Leistung\n");
    let text = localizer.localize("I18N_A", Language::German).await?;
    assert_eq!(text, "Leistung");
    assert_eq!(device.i18n_fetches("de_DE"), 2);

    device.shutdown().await
}

#[tokio::test]
async fn missing_table_is_a_fetch_error() -> anyhow::Result<()> {
    let device = MockDevice::start().await?;
    let localizer = localizer(&device);
    let err = localizer
        .localize("I18N_A", Language::Polish)
        .await
        .unwrap_err();
    assert!(matches!(err, I18nError::Fetch { lang: Language::Polish, .. }));
    assert!(err.is_fallback_safe());
    device.shutdown().await
}

#[tokio::test]
async fn concurrent_first_lookups_share_one_fetch() -> anyhow::Result<()> {
    let device = MockDevice::start().await?;
    device.set_translations("en_US", EN_US_PROPERTIES);
    let localizer = Arc::new(localizer(&device));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let localizer = localizer.clone();
        tasks.push(tokio::spawn(async move {
            localizer
                .localize("I18N_COMMON_RUNNING", Language::English)
                .await
        }));
    }
    for task in tasks {
        assert_eq!(task.await??, "Running");
    }
    assert_eq!(device.i18n_fetches("en_US"), 1);
    device.shutdown().await
}
