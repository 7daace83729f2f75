//! MAAS device synchronization
//!
//! Consumes the latest publish list and makes MAAS agree with it: a switch
//! already enrolled under the same hostname and MAC is left alone; a
//! hostname collision with a different MAC gets a disambiguated
//! `<name>-<mac>` hostname; a device with a matching MAC under another name
//! is renamed; anything else is enrolled as a new device and its first
//! interface is attached to the VLAN of the subnet containing its IP.

use ipnet::Ipv4Net;
use rackops_core::address::AddressRec;
use rackops_core::maas::{MaasClient, MaasDevice, MaasError};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

struct SubnetRec {
    cidr: Ipv4Net,
    vlan_id: String,
}

fn subnet_for_addr<'a>(subnets: &'a [SubnetRec], ip: &str) -> Option<&'a SubnetRec> {
    let ip: Ipv4Addr = ip.parse().ok()?;
    subnets.iter().find(|rec| rec.cidr.contains(&ip))
}

/// Index the MAAS device list by short hostname and by uppercase MAC.
fn index_devices(
    devices: Vec<MaasDevice>,
) -> (HashMap<String, MaasDevice>, HashMap<String, MaasDevice>) {
    let mut by_name = HashMap::new();
    let mut by_mac = HashMap::new();
    for device in devices {
        if let Some(mac) = device.primary_mac() {
            by_mac.insert(mac, device.clone());
        }
        by_name.insert(device.short_hostname().to_string(), device);
    }
    (by_name, by_mac)
}

/// Run the synchronizer, consuming publish lists until the channel closes.
pub async fn sync_to_maas(client: MaasClient, mut requests: mpsc::Receiver<Vec<AddressRec>>) {
    info!("starting MAAS switch synchronizer");
    while let Some(list) = requests.recv().await {
        if let Err(e) = sync_list(&client, list).await {
            error!(error = %e, "unable to synchronize switches to MAAS");
        }
    }
}

/// Synchronize one switch list into MAAS devices.
pub async fn sync_list(client: &MaasClient, list: Vec<AddressRec>) -> Result<(), MaasError> {
    let devices = client.list_devices().await?;
    let (by_name, by_mac) = index_devices(devices);

    let subnets = client.list_subnets().await?;
    let subnets: Vec<SubnetRec> = subnets
        .into_iter()
        .filter_map(|subnet| {
            let cidr: Ipv4Net = match subnet.cidr.parse() {
                Ok(cidr) => cidr,
                Err(e) => {
                    error!(cidr = %subnet.cidr, error = %e, "unable to parse subnet CIDR");
                    return None;
                }
            };
            Some(SubnetRec {
                cidr,
                vlan_id: subnet.vlan.id.to_string(),
            })
        })
        .collect();

    for mut rec in list {
        let mac = rec.mac.to_uppercase();

        if let Some(found) = by_name.get(&rec.name) {
            if found.primary_mac().as_deref() == Some(mac.as_str()) {
                info!(name = %rec.name, mac = %rec.mac, "device already in MAAS");
                continue;
            }
            // Same hostname, different MAC. The MAC is the identity, so
            // enroll under a hostname disambiguated with the MAC.
            warn!(name = %rec.name, mac = %rec.mac,
                "device exists in MAAS with a different MAC, augmenting hostname");
            let name_plus = format!(
                "{}-{}",
                rec.name,
                rec.mac.to_lowercase().replace(':', "")
            );
            if by_name.contains_key(&name_plus) {
                info!(name = %name_plus, mac = %rec.mac, "device already in MAAS");
                continue;
            }
            rec.name = name_plus;
        }

        if let Some(found) = by_mac.get(&mac) {
            // Known MAC under another hostname: bring the name up to date.
            info!(name = %rec.name, mac = %rec.mac,
                "device with matching MAC but different name found, updating name");
            if let Err(e) = client
                .update_resource(&found.resource_uri, &[("hostname", &rec.name)])
                .await
            {
                error!(name = %rec.name, mac = %rec.mac, error = %e,
                    "unable to update hostname for device in MAAS");
            }
            continue;
        }

        if let Err(e) = enroll_device(client, &rec, &subnets).await {
            error!(name = %rec.name, ip = %rec.ip, mac = %rec.mac, error = %e,
                "unable to synchronize switch to MAAS");
        }
    }
    Ok(())
}

/// Enroll a new device and attach its first interface to the right VLAN.
async fn enroll_device(
    client: &MaasClient,
    rec: &AddressRec,
    subnets: &[SubnetRec],
) -> Result<(), MaasError> {
    info!(name = %rec.name, mac = %rec.mac, "adding device to MAAS");
    let device = client.create_device(&rec.name, &rec.mac).await?;

    let Some(iface) = device.interface_set.first() else {
        error!(name = %rec.name, mac = %rec.mac, "device has no interfaces to configure");
        return Ok(());
    };

    let Some(subnet) = subnet_for_addr(subnets, &rec.ip) else {
        error!(name = %rec.name, mac = %rec.mac, ip = %rec.ip,
            "unable to find VLAN for device address");
        return Ok(());
    };

    if let Err(e) = client
        .update_resource(
            &iface.resource_uri,
            &[("name", "ma1"), ("vlan", &subnet.vlan_id)],
        )
        .await
    {
        error!(name = %rec.name, mac = %rec.mac, error = %e,
            "unable to update interface of device");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, RawQuery, State};
    use axum::routing::{get, put};
    use axum::{Json, Router};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    type Recorded = Arc<Mutex<Vec<String>>>;

    #[derive(Clone)]
    struct StubState {
        recorded: Recorded,
        devices: Arc<serde_json::Value>,
        subnets: Arc<serde_json::Value>,
    }

    async fn list_devices(State(state): State<StubState>) -> Json<serde_json::Value> {
        Json((*state.devices).clone())
    }

    async fn devices_post(
        State(state): State<StubState>,
        RawQuery(query): RawQuery,
        body: String,
    ) -> Json<serde_json::Value> {
        state
            .recorded
            .lock()
            .await
            .push(format!("POST devices/ {} {body}", query.unwrap_or_default()));
        Json(serde_json::json!({
            "system_id": "dev-1",
            "hostname": "leaf-1",
            "resource_uri": "/MAAS/api/1.0/devices/dev-1/",
            "interface_set": [
                { "id": 7, "resource_uri": "/MAAS/api/1.0/nodes/dev-1/interfaces/7/" }
            ]
        }))
    }

    async fn list_subnets(State(state): State<StubState>) -> Json<serde_json::Value> {
        Json((*state.subnets).clone())
    }

    async fn device_put(State(state): State<StubState>, Path(id): Path<String>, body: String) {
        state.recorded.lock().await.push(format!("PUT {id} {body}"));
    }

    async fn interface_put(
        State(state): State<StubState>,
        Path((id, ifc)): Path<(String, String)>,
        body: String,
    ) {
        state
            .recorded
            .lock()
            .await
            .push(format!("PUT {id}/interfaces/{ifc} {body}"));
    }

    async fn spawn_stub_maas(
        devices: serde_json::Value,
        subnets: serde_json::Value,
    ) -> (MaasClient, Recorded) {
        let state = StubState {
            recorded: Arc::new(Mutex::new(Vec::new())),
            devices: Arc::new(devices),
            subnets: Arc::new(subnets),
        };
        let recorded = state.recorded.clone();

        let app = Router::new()
            .route("/MAAS/api/1.0/devices/", get(list_devices).post(devices_post))
            .route("/MAAS/api/1.0/subnets/", get(list_subnets))
            .route("/MAAS/api/1.0/devices/{id}/", put(device_put))
            .route("/MAAS/api/1.0/nodes/{id}/interfaces/{ifc}/", put(interface_put))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client =
            MaasClient::new(&format!("http://{addr}/MAAS"), "ck:tk:ts", "1.0").unwrap();
        (client, recorded)
    }

    fn rec(name: &str, ip: &str, mac: &str) -> AddressRec {
        AddressRec {
            name: name.into(),
            ip: ip.into(),
            mac: mac.into(),
        }
    }

    fn subnets() -> serde_json::Value {
        serde_json::json!([
            { "name": "fabric", "cidr": "10.6.0.0/24", "vlan": { "id": 5002 } }
        ])
    }

    #[tokio::test]
    async fn test_new_switch_is_enrolled_with_vlan() {
        let (client, recorded) = spawn_stub_maas(serde_json::json!([]), subnets()).await;

        sync_list(&client, vec![rec("leaf-1", "10.6.0.2", "AA:BB:CC:DD:EE:01")])
            .await
            .unwrap();

        let recorded = recorded.lock().await;
        assert!(recorded
            .iter()
            .any(|r| r.starts_with("POST devices/") && r.contains("op=new")
                && r.contains("hostname=leaf-1")));
        assert!(recorded
            .iter()
            .any(|r| r.contains("name=ma1") && r.contains("vlan=5002")));
    }

    #[tokio::test]
    async fn test_matching_device_is_left_alone() {
        let devices = serde_json::json!([{
            "system_id": "dev-1",
            "hostname": "leaf-1.cord.lab",
            "resource_uri": "/MAAS/api/1.0/devices/dev-1/",
            "macaddress_set": [ { "mac_address": "aa:bb:cc:dd:ee:01" } ]
        }]);
        let (client, recorded) = spawn_stub_maas(devices, subnets()).await;

        sync_list(&client, vec![rec("leaf-1", "10.6.0.2", "AA:BB:CC:DD:EE:01")])
            .await
            .unwrap();

        assert!(recorded.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_matching_mac_with_other_name_is_renamed() {
        let devices = serde_json::json!([{
            "system_id": "dev-1",
            "hostname": "stale-name",
            "resource_uri": "/MAAS/api/1.0/devices/dev-1/",
            "macaddress_set": [ { "mac_address": "aa:bb:cc:dd:ee:01" } ]
        }]);
        let (client, recorded) = spawn_stub_maas(devices, subnets()).await;

        sync_list(&client, vec![rec("leaf-1", "10.6.0.2", "AA:BB:CC:DD:EE:01")])
            .await
            .unwrap();

        let recorded = recorded.lock().await;
        assert!(recorded
            .iter()
            .any(|r| r.starts_with("PUT dev-1") && r.contains("hostname=leaf-1")));
    }

    #[tokio::test]
    async fn test_hostname_collision_enrolls_disambiguated_name() {
        let devices = serde_json::json!([{
            "system_id": "dev-9",
            "hostname": "leaf-1",
            "resource_uri": "/MAAS/api/1.0/devices/dev-9/",
            "macaddress_set": [ { "mac_address": "99:99:99:99:99:99" } ]
        }]);
        let (client, recorded) = spawn_stub_maas(devices, subnets()).await;

        sync_list(&client, vec![rec("leaf-1", "10.6.0.2", "AA:BB:CC:DD:EE:01")])
            .await
            .unwrap();

        let recorded = recorded.lock().await;
        assert!(recorded
            .iter()
            .any(|r| r.contains("hostname=leaf-1-aabbccddee01")));
    }
}
