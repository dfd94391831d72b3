/*!
# SDN-PPO DevKit - Stubs et utilitaires pour tester le contrôleur

Bibliothèque facilitant les tests du contrôleur sans switch réel :
- Switch simulé qui enregistre les commandes reçues
- Fabrication de trames Ethernet (UDP, TCP, ARP)
- Harness qui assemble contrôleur + switches + topologie
*/

pub mod frames;
pub mod switch_stub;
pub mod test_utils;

pub use frames::FrameBuilder;
pub use switch_stub::MockSwitch;
pub use test_utils::TestHarness;
