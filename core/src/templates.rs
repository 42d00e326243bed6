//! Pre-built command batches for the router's configuration modules.
//!
//! Each function returns a fresh [`CommandBatch`]; [`suffix`] names the
//! endpoint variant the router expects for it. Field values are passed
//! through as given: addresses that the router stores numerically must be
//! converted with [`crate::ip`] first.

use crate::codec::{Command, CommandBatch};

/// Query-string codes selecting the `/cgi` endpoint variant.
pub mod suffix {
    pub const ROUTER_INFO: &str = "1&1&1&8";
    pub const STATISTICS: &str = "1&5";
    pub const ADDRESS_RESERVATIONS: &str = "5";
    pub const IP_MAC_BINDINGS: &str = "1&5";
    pub const BANDWIDTH_CONTROL_INFO: &str = "1&5&5";
    pub const SET: &str = "2";
    pub const ADD: &str = "3";
    pub const DELETE: &str = "4";
    pub const LOGOUT: &str = "";
}

/// Opaque `enable` codes for the `TC` module. Other values are router-specific.
pub const BANDWIDTH_CONTROL_OFF: u32 = 0;
pub const BANDWIDTH_CONTROL_ON: u32 = 3;

/// Fields returned for the wireless interface in the bandwidth control view.
pub const WLAN_FIELDS: [&str; 17] = [
    "name",
    "Standard",
    "SSID",
    "RegulatoryDomain",
    "PossibleChannels",
    "AutoChannelEnable",
    "Channel",
    "X_TP_Bandwidth",
    "Enable",
    "SSIDAdvertisementEnabled",
    "BeaconType",
    "BasicEncryptionModes",
    "WPAEncryptionModes",
    "IEEE11iEncryptionModes",
    "X_TP_Configuration_Modified",
    "WMMEnable",
    "X_TP_FragmentThreshold",
];

pub fn logout() -> CommandBatch {
    Command::query("/cgi/logout").into()
}

pub fn router_info() -> CommandBatch {
    CommandBatch::new()
        .with(Command::query("IGD_DEV_INFO").fields([
            "modelName",
            "description",
            "X_TP_isFD",
            "X_TP_ProductVersion",
        ]))
        .with(Command::query("ETH_SWITCH").field("numberOfVirtualPorts"))
        .with(Command::query("MULTIMODE").field("mode"))
        .with(Command::query("/cgi/info"))
}

pub fn statistics() -> CommandBatch {
    CommandBatch::new()
        .with(Command::query("STAT_CFG"))
        .with(Command::query("STAT_ENTRY"))
}

pub fn address_reservations() -> CommandBatch {
    Command::query("LAN_DHCP_STATIC_ADDR")
        .fields(["enable", "chaddr", "yiaddr"])
        .into()
}

pub fn ip_mac_bindings() -> CommandBatch {
    CommandBatch::new()
        .with(Command::query("ARP_BIND").field("enable"))
        .with(Command::query("ARP_BIND_ENTRY"))
}

pub fn bandwidth_control_info() -> CommandBatch {
    CommandBatch::new()
        .with(Command::query("TC"))
        .with(Command::query("TC_RULE"))
        .with(Command::query("LAN_WLAN").fields(WLAN_FIELDS))
}

/// `enable` is one of the opaque `BANDWIDTH_CONTROL_*` codes.
pub fn toggle_bandwidth_control(enable: u32, up_total: u32, down_total: u32) -> CommandBatch {
    Command::mutate("TC")
        .set("enable", enable)
        .set("linkType", 0)
        .set("upTotalBW", up_total)
        .set("downTotalBW", down_total)
        .into()
}

/// Limits for one bandwidth rule. Addresses are in numeric form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandwidthRule {
    pub start_ip: u32,
    pub end_ip: u32,
    pub up_min: u32,
    pub up_max: u32,
    pub down_min: u32,
    pub down_max: u32,
}

pub fn add_bandwidth_rule(rule: &BandwidthRule) -> CommandBatch {
    Command::mutate("TC_RULE")
        .set("enable", 1)
        .set("startIP", rule.start_ip)
        .set("endIP", rule.end_ip)
        .set("startPort", 0)
        .set("endPort", 0)
        .set("protocol", 0)
        .set("precedence", 5)
        .set("upMinBW", rule.up_min)
        .set("upMaxBW", rule.up_max)
        .set("downMinBW", rule.down_min)
        .set("downMaxBW", rule.down_max)
        .set("flag", 1)
        .into()
}

pub fn delete_bandwidth_rule(id: u32) -> CommandBatch {
    Command::mutate("TC_RULE").instance([id, 0, 0, 0, 0, 0]).into()
}

pub fn make_dhcp_reservation(mac: &str, ip: &str) -> CommandBatch {
    Command::mutate("LAN_DHCP_STATIC_ADDR")
        .delete_selector([1, 0, 0, 0, 0, 0])
        .set("chaddr", mac)
        .set("yiaddr", ip)
        .set("enable", 1)
        .into()
}

pub fn delete_dhcp_reservation(id: u32) -> CommandBatch {
    Command::mutate("LAN_DHCP_STATIC_ADDR")
        .instance([1, id, 0, 0, 0, 0])
        .into()
}

pub fn make_ip_mac_binding(ip: u32, mac: &str) -> CommandBatch {
    Command::mutate("ARP_BIND_ENTRY")
        .set("state", 1)
        .set("ip", ip)
        .set("mac", mac)
        .into()
}

pub fn delete_ip_mac_binding(id: u32) -> CommandBatch {
    Command::mutate("ARP_BIND_ENTRY")
        .instance([id, 0, 0, 0, 0, 0])
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(batch: CommandBatch) -> String {
        batch.encode().unwrap()
    }

    #[test]
    fn logout_wire() {
        assert_eq!(wire(logout()), "[/cgi/logout#0,0,0,0,0,0#0,0,0,0,0,0]0,0\r\n");
    }

    #[test]
    fn router_info_wire() {
        assert_eq!(
            wire(router_info()),
            "[IGD_DEV_INFO#0,0,0,0,0,0#0,0,0,0,0,0]0,4\r\nmodelName\r\ndescription\r\nX_TP_isFD\r\nX_TP_ProductVersion\r\n\
             [ETH_SWITCH#0,0,0,0,0,0#0,0,0,0,0,0]1,1\r\nnumberOfVirtualPorts\r\n\
             [MULTIMODE#0,0,0,0,0,0#0,0,0,0,0,0]2,1\r\nmode\r\n\
             [/cgi/info#0,0,0,0,0,0#0,0,0,0,0,0]3,0\r\n"
        );
    }

    #[test]
    fn statistics_wire() {
        assert_eq!(
            wire(statistics()),
            "[STAT_CFG#0,0,0,0,0,0#0,0,0,0,0,0]0,0\r\n[STAT_ENTRY#0,0,0,0,0,0#0,0,0,0,0,0]1,0\r\n"
        );
    }

    #[test]
    fn bandwidth_control_info_asks_for_wlan_fields() {
        let batch = bandwidth_control_info();
        assert_eq!(batch.len(), 3);
        assert!(wire(batch).contains("[LAN_WLAN#0,0,0,0,0,0#0,0,0,0,0,0]2,17\r\nname\r\nStandard\r\nSSID\r\n"));
    }

    #[test]
    fn toggle_bandwidth_control_wire() {
        assert_eq!(
            wire(toggle_bandwidth_control(BANDWIDTH_CONTROL_ON, 1000, 5000)),
            "[TC#0,0,0,0,0,0#0,0,0,0,0,0]0,4\r\nenable=3\r\nlinkType=0\r\nupTotalBW=1000\r\ndownTotalBW=5000\r\n"
        );
    }

    #[test]
    fn add_bandwidth_rule_wire() {
        let rule = BandwidthRule {
            start_ip: 3232235876,
            end_ip: 3232235880,
            up_min: 100,
            up_max: 200,
            down_min: 300,
            down_max: 400,
        };
        assert_eq!(
            wire(add_bandwidth_rule(&rule)),
            "[TC_RULE#0,0,0,0,0,0#0,0,0,0,0,0]0,12\r\nenable=1\r\nstartIP=3232235876\r\nendIP=3232235880\r\n\
             startPort=0\r\nendPort=0\r\nprotocol=0\r\nprecedence=5\r\nupMinBW=100\r\nupMaxBW=200\r\n\
             downMinBW=300\r\ndownMaxBW=400\r\nflag=1\r\n"
        );
    }

    #[test]
    fn delete_wires_address_instance() {
        assert_eq!(
            wire(delete_bandwidth_rule(4)),
            "[TC_RULE#4,0,0,0,0,0#0,0,0,0,0,0]0,0\r\n"
        );
        assert_eq!(
            wire(delete_dhcp_reservation(7)),
            "[LAN_DHCP_STATIC_ADDR#1,7,0,0,0,0#0,0,0,0,0,0]0,0\r\n"
        );
        assert_eq!(
            wire(delete_ip_mac_binding(2)),
            "[ARP_BIND_ENTRY#2,0,0,0,0,0#0,0,0,0,0,0]0,0\r\n"
        );
    }

    #[test]
    fn make_reservation_and_binding_wire() {
        assert_eq!(
            wire(make_dhcp_reservation("AA-BB-CC-DD-EE-FF", "192.168.1.100")),
            "[LAN_DHCP_STATIC_ADDR#0,0,0,0,0,0#1,0,0,0,0,0]0,3\r\nchaddr=AA-BB-CC-DD-EE-FF\r\nyiaddr=192.168.1.100\r\nenable=1\r\n"
        );
        assert_eq!(
            wire(make_ip_mac_binding(3232235876, "AA-BB-CC-DD-EE-FF")),
            "[ARP_BIND_ENTRY#0,0,0,0,0,0#0,0,0,0,0,0]0,3\r\nstate=1\r\nip=3232235876\r\nmac=AA-BB-CC-DD-EE-FF\r\n"
        );
    }
}
