//! Billing tab: the hospital's subscription and how many product licenses
//! are in use.

use crate::api::batch::join2;
use crate::app::SelectedApp;
use crate::components::hospital::TabPage;
use crate::components::widgets::{self, ConfirmDialog};
use crate::context::AppContext;
use crate::forms::StatusBanner;
use crate::models::{format_date, ProductLicenseStats, Subscription};
use crate::rbac::resources::BILLING;
use crate::tui::Frame;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{prelude::*, widgets::*};
use tracing::{info, warn};

pub struct BillingPage {
    subscription: Option<Subscription>,
    licenses: Vec<ProductLicenseStats>,
    table: TableState,
    dialog: Option<ConfirmDialog>,
    banner: StatusBanner,
}

impl BillingPage {
    pub fn mount(ctx: &AppContext) -> Self {
        let mut page = Self {
            subscription: None,
            licenses: Vec::new(),
            table: TableState::default(),
            dialog: None,
            banner: StatusBanner::new(),
        };
        page.reload(ctx);
        page
    }

    fn reload(&mut self, ctx: &AppContext) {
        let api = &ctx.api;
        let (subscription, licenses) = join2(|| api.subscription(), || api.license_stats());
        match subscription {
            Ok(subscription) => self.subscription = subscription,
            Err(err) => {
                warn!(error = %err, "could not load subscription");
                self.banner.error(err.user_message());
            }
        }
        match licenses {
            Ok(licenses) => self.licenses = licenses,
            Err(err) if self.subscription.is_none() => {
                warn!(error = %err, "no license stats without a subscription");
                self.licenses.clear();
            }
            Err(err) => {
                warn!(error = %err, "could not load license stats");
                self.banner.error(err.user_message());
            }
        }
        widgets::clamp_selection(&mut self.table, self.licenses.len());
    }

    fn can_cancel(&self, ctx: &AppContext) -> bool {
        ctx.rbac.can_edit(BILLING)
            && self
                .subscription
                .as_ref()
                .is_some_and(|subscription| !subscription.cancel_at_period_end)
    }

    fn cancel_subscription(&mut self, ctx: &AppContext) {
        match ctx.api.cancel_subscription() {
            Ok(()) => {
                info!("subscription cancelled");
                self.reload(ctx);
                self.banner
                    .success("Subscription will end with the current billing period");
            }
            Err(err) => {
                warn!(error = %err, "subscription cancel failed");
                self.banner.error(err.user_message());
            }
        }
    }

    fn subscription_lines(&self) -> Vec<Line<'static>> {
        let Some(subscription) = &self.subscription else {
            return vec![Line::from(Span::styled(
                "No active subscription.",
                Style::default().fg(widgets::MUTED),
            ))];
        };
        let mut lines = vec![
            widgets::detail_line(
                "Plan",
                subscription.plan_name.as_deref().unwrap_or("-"),
            ),
            widgets::detail_line("Status", &subscription.status),
            widgets::detail_line(
                "Billing cycle",
                subscription.billing_cycle.as_deref().unwrap_or("-"),
            ),
            widgets::detail_line(
                "Current period",
                &format!(
                    "{} to {}",
                    format_date(subscription.current_period_start),
                    format_date(subscription.current_period_end)
                ),
            ),
        ];
        if subscription.cancel_at_period_end {
            lines.push(Line::from(Span::styled(
                format!(
                    "Cancels on {}",
                    format_date(subscription.current_period_end)
                ),
                Style::default().fg(widgets::ERROR),
            )));
        }
        lines
    }
}

impl TabPage for BillingPage {
    fn handle_input(&mut self, key: KeyEvent, ctx: &mut AppContext) -> Result<Option<SelectedApp>> {
        if let Some(dialog) = &mut self.dialog {
            match dialog.handle_key(key) {
                Some(true) => {
                    self.dialog = None;
                    self.cancel_subscription(ctx);
                }
                Some(false) => self.dialog = None,
                None => {}
            }
            return Ok(None);
        }

        match key.code {
            KeyCode::Down => widgets::wrap_selection(&mut self.table, self.licenses.len(), true),
            KeyCode::Up => widgets::wrap_selection(&mut self.table, self.licenses.len(), false),
            KeyCode::Char('c') if self.can_cancel(ctx) => {
                self.dialog = Some(ConfirmDialog::new(
                    "Cancel subscription",
                    "Cancel the subscription at the end of the current period?",
                ));
            }
            KeyCode::Char('r') => self.reload(ctx),
            KeyCode::Esc => return Ok(Some(SelectedApp::None)),
            _ => {}
        }
        Ok(None)
    }

    fn render(&self, frame: &mut Frame, area: Rect, ctx: &AppContext) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(7),
                Constraint::Min(5),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(area);

        frame.render_widget(
            Paragraph::new(self.subscription_lines()).block(widgets::panel("Subscription")),
            layout[0],
        );

        let rows: Vec<Row> = self
            .licenses
            .iter()
            .map(|product| {
                let available = product.available();
                let color = if available == 0 {
                    widgets::ERROR
                } else {
                    widgets::SUCCESS
                };
                Row::new(vec![
                    Cell::from(product.product_name.clone()),
                    Cell::from(product.purchased.to_string()),
                    Cell::from(product.assigned.to_string()),
                    Cell::from(available.to_string()).style(Style::default().fg(color)),
                ])
                .style(Style::default().fg(widgets::TEXT))
            })
            .collect();
        let table = Table::new(
            rows,
            [
                Constraint::Percentage(40),
                Constraint::Percentage(20),
                Constraint::Percentage(20),
                Constraint::Percentage(20),
            ],
        )
        .header(widgets::table_header(&["Product", "Purchased", "Assigned", "Available"]))
        .block(widgets::panel("Licenses"))
        .row_highlight_style(widgets::selected_row_style());
        frame.render_stateful_widget(table, layout[1], &mut self.table.clone());

        frame.render_widget(widgets::status_line(&self.banner), layout[2]);

        let help = if self.can_cancel(ctx) {
            "↑↓: Select | c: Cancel subscription | r: Reload | Esc: Back"
        } else {
            "↑↓: Select | r: Reload | Esc: Back"
        };
        frame.render_widget(widgets::help(help), layout[3]);

        if let Some(dialog) = &self.dialog {
            dialog.render(frame);
        }
    }

    fn tick(&mut self) {
        self.banner.check_timeout();
    }

    fn is_capturing(&self) -> bool {
        self.dialog.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockTransport;
    use crate::api::Method;
    use crate::context::testing::{signed_in, super_admin};
    use serde_json::json;

    fn subscription(cancelling: bool) -> serde_json::Value {
        json!({
            "id": "sub1",
            "planName": "Clinic Pro",
            "status": "active",
            "billingCycle": "monthly",
            "currentPeriodStart": "2026-01-01T00:00:00Z",
            "currentPeriodEnd": "2026-02-01T00:00:00Z",
            "cancelAtPeriodEnd": cancelling
        })
    }

    fn stats() -> serde_json::Value {
        json!([{ "productCode": "ehr", "productName": "EHR", "purchased": 3, "assigned": 3 }])
    }

    fn press(page: &mut BillingPage, ctx: &mut AppContext, code: KeyCode) -> Option<SelectedApp> {
        page.handle_input(KeyEvent::from(code), ctx).unwrap()
    }

    #[test]
    fn cancel_asks_then_refetches() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v1/products/subscription", 200, subscription(false));
        mock.respond(Method::Get, "/v1/products/subscription", 200, subscription(true));
        mock.respond(Method::Get, "/v1/products/subscription/license-stats", 200, stats());
        mock.respond_raw(Method::Post, "/v1/products/subscription/cancel", 204, "");
        let mut ctx = super_admin(&mock);
        let mut page = BillingPage::mount(&ctx);

        press(&mut page, &mut ctx, KeyCode::Char('c'));
        assert!(page.is_capturing());
        press(&mut page, &mut ctx, KeyCode::Char('y'));

        assert_eq!(
            mock.requests_to(Method::Post, "/v1/products/subscription/cancel").len(),
            1
        );
        assert!(page.subscription.as_ref().unwrap().cancel_at_period_end);
        assert!(page.banner.is_success());

        // Already cancelling: nothing left to cancel.
        press(&mut page, &mut ctx, KeyCode::Char('c'));
        assert!(!page.is_capturing());
    }

    #[test]
    fn declining_sends_nothing() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v1/products/subscription", 200, subscription(false));
        mock.respond(Method::Get, "/v1/products/subscription/license-stats", 200, stats());
        let mut ctx = super_admin(&mock);
        let mut page = BillingPage::mount(&ctx);

        press(&mut page, &mut ctx, KeyCode::Char('c'));
        press(&mut page, &mut ctx, KeyCode::Enter);
        assert!(!page.is_capturing());
        assert!(mock
            .requests_to(Method::Post, "/v1/products/subscription/cancel")
            .is_empty());
    }

    #[test]
    fn no_subscription_is_not_an_error() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v1/products/subscription", 404, json!({ "message": "none" }));
        mock.respond(Method::Get, "/v1/products/subscription/license-stats", 404, json!({ "message": "none" }));
        let mut ctx = super_admin(&mock);
        let mut page = BillingPage::mount(&ctx);

        assert!(page.subscription.is_none());
        assert!(page.licenses.is_empty());
        assert!(!page.banner.is_error());
        press(&mut page, &mut ctx, KeyCode::Char('c'));
        assert!(!page.is_capturing());
    }

    #[test]
    fn view_only_cannot_cancel_and_esc_leaves() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v1/products/subscription", 200, subscription(false));
        mock.respond(Method::Get, "/v1/products/subscription/license-stats", 200, stats());
        let mut ctx = signed_in(
            &mock,
            json!({ "permissions": [{ "resource": "billing", "actions": ["view"] }] }),
        );
        let mut page = BillingPage::mount(&ctx);
        assert_eq!(page.licenses[0].available(), 0);

        press(&mut page, &mut ctx, KeyCode::Char('c'));
        assert!(!page.is_capturing());
        assert_eq!(press(&mut page, &mut ctx, KeyCode::Esc), Some(SelectedApp::None));
    }
}
