/**
 * SDNPPO CONTROLLER - Contrôleur SDN pour l'expérience de rate-limiting
 *
 * RÔLE : Routage plus court chemin, meter unique piloté par une valeur u ∈ [0,1],
 * télémétrie lissée des ports et API REST pour l'agent d'apprentissage.
 *
 * Le binaire (main.rs) assemble ces modules; devkit et les tests s'appuient
 * directement sur la bibliothèque.
 */

pub mod config;
pub mod controller;
pub mod events;
pub mod flows;
pub mod health;
pub mod hosts;
pub mod http;
pub mod meter;
pub mod models;
pub mod packet;
pub mod routing;
pub mod southbound;
pub mod state;
pub mod switch;
pub mod telemetry;
pub mod topology;

pub use config::ControllerConfig;
pub use controller::Controller;
pub use events::{event_channel, NetworkEvent};
pub use flows::{PacketDisposition, PacketIn};
pub use models::{Dpid, LinkDesc, MetricsSnapshot, PortCounters, PortNo};
pub use switch::{SwitchCommand, SwitchHandle};
