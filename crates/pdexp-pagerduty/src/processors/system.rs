use async_trait::async_trait;
use pdexp_collector::{CollectContext, Emitter, Processor, ResetGroup, SinkRegistrar};
use pdexp_common::error::Result;
use pdexp_metrics::{MetricList, labels};

use crate::client::PagerDutyClient;

pub const SYSTEM_LICENSE_INFO: &str = "pagerduty_system_license_info";
pub const SYSTEM_LICENSE_CURRENT: &str = "pagerduty_system_license_current";
pub const SYSTEM_LICENSE_ALLOCATIONS_AVAILABLE: &str = "pagerduty_system_license_allocations_available";

const LICENSE_LABELS: [&str; 3] = ["licenseID", "licenseType", "licenseName"];

/// Account license usage.
pub struct SystemProcessor {
    client: PagerDutyClient,
    group: ResetGroup,
}

impl SystemProcessor {
    pub fn new(client: PagerDutyClient) -> Self {
        Self {
            client,
            group: ResetGroup::new(),
        }
    }
}

#[async_trait]
impl Processor for SystemProcessor {
    fn setup(&mut self, registrar: &mut SinkRegistrar<'_>) -> Result<()> {
        let info = registrar.gauge(SYSTEM_LICENSE_INFO, "PagerDuty license", &LICENSE_LABELS)?;
        let current = registrar.gauge(
            SYSTEM_LICENSE_CURRENT,
            "PagerDuty license current value",
            &LICENSE_LABELS,
        )?;
        let available = registrar.gauge(
            SYSTEM_LICENSE_ALLOCATIONS_AVAILABLE,
            "PagerDuty license allocations available",
            &LICENSE_LABELS,
        )?;
        self.group.gauge(info).gauge(current).gauge(available);
        Ok(())
    }

    fn reset(&self) {
        self.group.reset();
    }

    async fn collect(&self, _ctx: &CollectContext, emitter: Emitter) -> Result<()> {
        let mut info = MetricList::new();
        let mut current = MetricList::new();
        let mut available = MetricList::new();
        for license in self.client.list_licenses().await? {
            let labels = labels! {
                "licenseID" => license.id,
                "licenseType" => license.kind,
                "licenseName" => license.name,
            };
            current.add_gauge(labels.clone(), license.current_value);
            available.add_gauge(labels.clone(), license.allocations_available);
            info.add_info(labels);
        }

        emitter.gauges(SYSTEM_LICENSE_INFO, info).await?;
        emitter.gauges(SYSTEM_LICENSE_CURRENT, current).await?;
        emitter
            .gauges(SYSTEM_LICENSE_ALLOCATIONS_AVAILABLE, available)
            .await
    }
}
