use crossbeam_channel::{Receiver, Sender};
use mint_client::Settings;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::{
    events::UiEvent,
    orchestration::dispatch_backend_command,
    reducer::{reduce, MintViewState, StatusBannerSeverity},
};

const TITLE: &str = "My NFT Collection";
const TAGLINE: &str = "Each unique. Each beautiful. Discover your NFT today.";

#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub total_supply: u64,
    pub collection_url: String,
    pub creator_handle: String,
    pub creator_url: String,
}

impl StartupConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            total_supply: settings.total_supply,
            collection_url: settings.collection_url.clone(),
            creator_handle: settings.creator_handle.clone(),
            creator_url: settings.creator_url(),
        }
    }
}

pub struct MintGuiApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,
    startup: StartupConfig,
    view: MintViewState,
}

impl MintGuiApp {
    pub fn new(
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
        startup: StartupConfig,
    ) -> Self {
        let mut app = Self {
            cmd_tx,
            ui_rx,
            view: MintViewState::new(startup.total_supply),
            startup,
        };
        app.dispatch(BackendCommand::CheckExistingConnection);
        app.dispatch(BackendCommand::CheckNetwork);
        app
    }

    fn dispatch(&mut self, cmd: BackendCommand) {
        dispatch_backend_command(&self.cmd_tx, cmd, &mut self.view.status);
    }

    fn process_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            reduce(&mut self.view, event);
        }
    }

    fn show_status_banner(&mut self, ui: &mut egui::Ui) {
        if let Some(banner) = self.view.status_banner.clone() {
            let (fill, stroke) = match banner.severity {
                StatusBannerSeverity::Error => (
                    egui::Color32::from_rgb(111, 53, 53),
                    egui::Stroke::new(1.0, egui::Color32::from_rgb(175, 96, 96)),
                ),
            };

            egui::Frame::NONE
                .fill(fill)
                .stroke(stroke)
                .corner_radius(8.0)
                .inner_margin(egui::Margin::symmetric(10, 8))
                .show(ui, |ui| {
                    ui.horizontal_wrapped(|ui| {
                        ui.label(egui::RichText::new(&banner.message).color(egui::Color32::WHITE));
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if ui.button("Dismiss").clicked() {
                                self.view.status_banner = None;
                            }
                        });
                    });
                });
        }
    }

    fn show_alert(&mut self, ctx: &egui::Context) {
        let Some(message) = self.view.current_alert().map(str::to_owned) else {
            return;
        };
        let mut dismissed = false;
        egui::Window::new("Notice")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.set_max_width(420.0);
                ui.label(message);
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
        if dismissed {
            self.view.dismiss_alert();
        }
    }

    fn show_actions(&mut self, ui: &mut egui::Ui) {
        let blocked = self.view.current_alert().is_some();
        if self.view.account.is_none() {
            let label = if self.view.connect_in_flight {
                "Connecting..."
            } else {
                "Connect Wallet"
            };
            let button = egui::Button::new(egui::RichText::new(label).size(18.0));
            if ui
                .add_enabled(self.view.can_connect() && !blocked, button)
                .clicked()
            {
                self.dispatch(BackendCommand::Connect);
            }
        } else {
            let label = if self.view.mint_in_flight {
                "Minting..."
            } else {
                "Mint NFT"
            };
            let button = egui::Button::new(egui::RichText::new(label).size(18.0));
            if ui
                .add_enabled(self.view.can_mint() && !blocked, button)
                .clicked()
            {
                self.dispatch(BackendCommand::Mint);
            }
        }
    }
}

impl eframe::App for MintGuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events();

        egui::TopBottomPanel::bottom("footer").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("built by");
                ui.hyperlink_to(
                    format!("@{}", self.startup.creator_handle),
                    &self.startup.creator_url,
                );
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.small(&self.view.status);
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.show_status_banner(ui);
            ui.vertical_centered(|ui| {
                ui.add_space(24.0);
                ui.heading(egui::RichText::new(TITLE).size(32.0).strong());
                ui.label(TAGLINE);
                ui.add_space(16.0);
                self.show_actions(ui);
                if let Some(progress) = self.view.progress_line() {
                    ui.add_space(8.0);
                    ui.label(progress);
                    ui.hyperlink_to("View Collection", &self.startup.collection_url);
                }
                if let Some(account) = &self.view.account {
                    ui.add_space(8.0);
                    ui.small(format!("Connected as {account}"));
                }
                if let Some(url) = &self.view.last_tx_url {
                    ui.hyperlink_to("Last mint transaction", url);
                }
            });
        });

        self.show_alert(ctx);

        if self.view.connect_in_flight || self.view.mint_in_flight {
            ctx.request_repaint_after(std::time::Duration::from_millis(16));
        } else {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }
}
