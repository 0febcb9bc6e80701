/**
 * MONITOR - Bootstrap et cycle de vie du process
 *
 * RÔLE : Lie les trois sockets (UDP télémétrie, TCP alertes, HTTP/WS viewers),
 * crée le hub avec les ports réellement obtenus, lance les tâches et gère
 * l'arrêt propre.
 *
 * Un échec de bind est fatal : rien n'est lancé tant que les trois ports ne
 * sont pas acquis.
 */

use crate::alerts::run_alert_listener;
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::http::{build_router, AppState};
use crate::hub::{Hub, HubSettings};
use crate::models::CnInfo;
use crate::telemetry::run_telemetry_listener;
use std::future::Future;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::watch;
use tracing::{info, warn};

pub struct Monitor {
    config: MonitorConfig,
    udp: UdpSocket,
    alerts: TcpListener,
    http: TcpListener,
    hub: Hub,
}

impl Monitor {
    pub async fn bind(config: MonitorConfig) -> Result<Self, MonitorError> {
        let udp_addr = format!("{}:{}", config.host, config.ports.udp);
        let udp = UdpSocket::bind(&udp_addr)
            .await
            .map_err(|source| MonitorError::Bind { channel: "telemetry (udp)", addr: udp_addr.clone(), source })?;

        let tcp_addr = format!("{}:{}", config.host, config.ports.tcp);
        let alerts = TcpListener::bind(&tcp_addr)
            .await
            .map_err(|source| MonitorError::Bind { channel: "alerts (tcp)", addr: tcp_addr.clone(), source })?;

        let ws_addr = format!("{}:{}", config.host, config.ports.ws);
        let http = TcpListener::bind(&ws_addr)
            .await
            .map_err(|source| MonitorError::Bind { channel: "viewer (http/ws)", addr: ws_addr.clone(), source })?;

        let ports = CnInfo {
            udp_port: udp.local_addr()?.port(),
            tcp_port: alerts.local_addr()?.port(),
            ws_port: http.local_addr()?.port(),
        };
        let hub = Hub::new(HubSettings {
            ports,
            viewer_queue_capacity: config.hub.viewer_queue_capacity,
            alert_log_capacity: config.hub.alert_log_capacity,
        });

        Ok(Self { config, udp, alerts, http, hub })
    }

    pub fn hub(&self) -> Hub {
        self.hub.clone()
    }

    pub fn ports(&self) -> CnInfo {
        self.hub.stats().ports
    }

    /// Tourne jusqu'à ce que `shutdown` se résolve, puis arrête tout
    pub async fn run<F>(self, shutdown: F) -> Result<(), MonitorError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Monitor { config, udp, alerts, http, hub } = self;
        let ports = hub.stats().ports;
        info!(
            "monitor up: udp={} tcp={} ws={}",
            ports.udp_port, ports.tcp_port, ports.ws_port
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let telemetry_task = tokio::spawn(run_telemetry_listener(udp, hub.clone(), stop_rx.clone()));
        let alerts_task = tokio::spawn(run_alert_listener(
            alerts,
            hub.clone(),
            config.alerts.max_frame_bytes,
            stop_rx,
        ));

        let app = build_router(AppState {
            hub: hub.clone(),
            gateway: config.gateway_settings(),
        });

        let signal_hub = hub.clone();
        let served = axum::serve(http, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("shutdown requested");
                let _ = stop_tx.send(true);
                // ferme les abonnements : chaque session viewer se termine
                signal_hub.close();
            })
            .await;

        for (name, task) in [("telemetry", telemetry_task), ("alerts", alerts_task)] {
            if let Err(e) = task.await {
                warn!("{name} listener task ended abnormally: {e}");
            }
        }
        hub.close();
        info!("monitor stopped");
        served.map_err(MonitorError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConf, PortsConf};
    use serde_json::Value;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::{sleep, timeout};
    use wardwatch_devkit::{fixtures, AlertSender, TelemetrySender, ViewerClient};

    const WAIT: Duration = Duration::from_secs(5);

    struct Running {
        ports: CnInfo,
        hub: Hub,
        stop: oneshot::Sender<()>,
        task: tokio::task::JoinHandle<Result<(), MonitorError>>,
    }

    impl Running {
        fn addr(&self, port: u16) -> SocketAddr {
            SocketAddr::from(([127, 0, 0, 1], port))
        }

        fn ws_url(&self) -> String {
            format!("ws://127.0.0.1:{}/ws", self.ports.ws_port)
        }
    }

    async fn start(mut config: MonitorConfig) -> Running {
        wardwatch_devkit::init_test_logging();
        config.host = "127.0.0.1".into();
        config.ports = PortsConf { udp: 0, tcp: 0, ws: 0 };
        let monitor = Monitor::bind(config).await.unwrap();
        let ports = monitor.ports();
        let hub = monitor.hub();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(monitor.run(async move {
            let _ = stopped.await;
        }));
        Running { ports, hub, stop, task }
    }

    fn quiet_config() -> MonitorConfig {
        MonitorConfig {
            gateway: GatewayConf { stats_interval_ms: 60_000, send_timeout_ms: 2_000 },
            ..Default::default()
        }
    }

    /// Échantillon dont la fréquence cardiaque sert de numéro de séquence
    fn marked(patient_id: &str, n: i32) -> crate::models::TelemetrySample {
        crate::models::TelemetrySample {
            patient_id: patient_id.into(),
            vitals: crate::models::Vitals {
                heart_rate: n,
                spo2: 97.0,
                blood_pressure_sys: 120,
                blood_pressure_dia: 80,
                temperature: 36.6,
                respiration_rate: 14,
            },
            timestamp: n as f64,
        }
    }

    async fn wait_viewers(hub: &Hub, count: usize) {
        timeout(WAIT, async {
            while hub.subscriber_count() != count {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("viewer count not reached");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_telemetry_end_to_end_before_and_after_viewer() {
        let running = start(quiet_config()).await;

        let mut early = ViewerClient::connect(&running.ws_url()).await.unwrap();
        let snapshot = early.next_of_type("snapshot", WAIT).await.unwrap();
        assert_eq!(snapshot["data"]["patients"], serde_json::json!({}));
        assert_eq!(snapshot["data"]["cn_info"]["udp_port"], running.ports.udp_port);
        wait_viewers(&running.hub, 1).await;

        let sender = TelemetrySender::connect(running.addr(running.ports.udp_port)).await.unwrap();
        let payload = fixtures::telemetry("P1", 88, 1_700_000_000.0);
        sender.send(&payload).await.unwrap();

        let telemetry = early.next_of_type("telemetry", WAIT).await.unwrap();
        assert_eq!(telemetry["data"]["patient_id"], "P1");
        assert_eq!(telemetry["data"]["vitals"], payload["vitals"]);

        let mut late = ViewerClient::connect(&running.ws_url()).await.unwrap();
        let snapshot = late.next_of_type("snapshot", WAIT).await.unwrap();
        assert_eq!(snapshot["data"]["patients"]["P1"]["vitals"], payload["vitals"]);
        assert_eq!(snapshot["data"]["patients"]["P1"]["timestamp"], 1_700_000_000.0);

        // une seule télémétrie pour le viewer du début
        assert!(early.next_of_type("telemetry", Duration::from_millis(200)).await.is_err());

        running.stop.send(()).unwrap();
        timeout(WAIT, running.task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_alerts_fan_out_and_snapshot_log() {
        let running = start(quiet_config()).await;
        let mut viewer = ViewerClient::connect(&running.ws_url()).await.unwrap();
        viewer.next_of_type("snapshot", WAIT).await.unwrap();
        wait_viewers(&running.hub, 1).await;

        let mut sender = AlertSender::connect(running.addr(running.ports.tcp_port)).await.unwrap();
        let mut alert = fixtures::alert("P2", "hypoxia", "high", "Detected hypoxia", 10.0);
        alert["vitals"] = fixtures::vitals(101);
        sender.send(&alert).await.unwrap();

        let received = viewer.next_of_type("alert", WAIT).await.unwrap();
        assert_eq!(received["data"]["patient_id"], "P2");
        assert_eq!(received["data"]["type"], "hypoxia");
        assert_eq!(received["data"]["severity"], "high");
        assert_eq!(received["data"]["vitals"]["heart_rate"], 101);

        let mut late = ViewerClient::connect(&running.ws_url()).await.unwrap();
        let snapshot = late.next_of_type("snapshot", WAIT).await.unwrap();
        let alerts = snapshot["data"]["alerts"].as_array().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["message"], "Detected hypoxia");
        assert_eq!(snapshot["data"]["patients"]["P2"]["vitals"]["heart_rate"], 101);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_periodic_cn_stats() {
        let config = MonitorConfig {
            gateway: GatewayConf { stats_interval_ms: 100, send_timeout_ms: 2_000 },
            ..Default::default()
        };
        let running = start(config).await;
        let _alerts = AlertSender::connect(running.addr(running.ports.tcp_port)).await.unwrap();
        let mut viewer = ViewerClient::connect(&running.ws_url()).await.unwrap();
        viewer.next_of_type("snapshot", WAIT).await.unwrap();

        let mut stats = Value::Null;
        // la connexion d'alertes peut être comptée un tick plus tard
        for _ in 0..20 {
            stats = viewer.next_of_type("cn_stats", WAIT).await.unwrap();
            if stats["data"]["tcp_connections"] == 1 {
                break;
            }
        }
        assert_eq!(stats["data"]["tcp_connections"], 1);
        assert_eq!(stats["data"]["tcp_port"], running.ports.tcp_port);
        assert_eq!(stats["data"]["ws_port"], running.ports.ws_port);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shutdown_closes_viewers() {
        let running = start(quiet_config()).await;
        let mut viewer = ViewerClient::connect(&running.ws_url()).await.unwrap();
        viewer.next_of_type("snapshot", WAIT).await.unwrap();
        wait_viewers(&running.hub, 1).await;

        running.stop.send(()).unwrap();
        assert!(viewer.wait_closed(WAIT).await.unwrap());
        timeout(WAIT, running.task).await.unwrap().unwrap().unwrap();
        assert_eq!(running.hub.subscriber_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stalled_viewer_is_cut_by_send_timeout() {
        let config = MonitorConfig {
            hub: crate::config::HubConf { viewer_queue_capacity: 4096, alert_log_capacity: 10 },
            gateway: GatewayConf { stats_interval_ms: 60_000, send_timeout_ms: 500 },
            ..Default::default()
        };
        let running = start(config).await;

        let mut stalled = ViewerClient::connect(&running.ws_url()).await.unwrap();
        stalled.next_of_type("snapshot", WAIT).await.unwrap();
        // plus aucune lecture : les buffers TCP finissent par se remplir
        let _frozen = stalled.into_stalled();

        let mut healthy = ViewerClient::connect(&running.ws_url()).await.unwrap();
        healthy.next_of_type("snapshot", WAIT).await.unwrap();
        wait_viewers(&running.hub, 2).await;

        const EVENTS: i32 = 2000;
        let reader = tokio::spawn(async move {
            let mut last = -1;
            for _ in 0..EVENTS {
                let message = healthy.next_of_type("telemetry", WAIT).await.unwrap();
                let heart_rate = message["data"]["vitals"]["heart_rate"].as_i64().unwrap() as i32;
                assert_eq!(heart_rate, last + 1);
                last = heart_rate;
            }
            last
        });

        let bulky_id = format!("P-{}", "x".repeat(16 * 1024));
        for n in 0..EVENTS {
            running.hub.apply_telemetry(marked(&bulky_id, n));
            if n % 100 == 0 {
                tokio::task::yield_now().await;
            }
        }

        assert_eq!(timeout(Duration::from_secs(30), reader).await.unwrap().unwrap(), EVENTS - 1);
        wait_viewers(&running.hub, 1).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_viewer_past_queue_limit_is_cut_others_keep_up() {
        let config = MonitorConfig {
            hub: crate::config::HubConf { viewer_queue_capacity: 8, alert_log_capacity: 10 },
            gateway: GatewayConf { stats_interval_ms: 60_000, send_timeout_ms: 60_000 },
            ..Default::default()
        };
        let running = start(config).await;

        // ne lit plus après le snapshot : socket plein, puis file pleine
        let mut stalled = ViewerClient::connect(&running.ws_url()).await.unwrap();
        stalled.next_of_type("snapshot", WAIT).await.unwrap();

        let mut healthy = ViewerClient::connect(&running.ws_url()).await.unwrap();
        healthy.next_of_type("snapshot", WAIT).await.unwrap();
        wait_viewers(&running.hub, 2).await;

        let bulky_id = format!("P-{}", "x".repeat(16 * 1024));
        let mut n = 0;
        while running.hub.subscriber_count() == 2 {
            assert!(n < 20_000, "stalled viewer never overflowed");
            running.hub.apply_telemetry(marked(&bulky_id, n));
            // au pas du viewer sain : sa file ne dépasse jamais un événement
            let message = healthy.next_of_type("telemetry", WAIT).await.unwrap();
            assert_eq!(message["data"]["vitals"]["heart_rate"], n);
            n += 1;
        }
        assert_eq!(running.hub.subscriber_count(), 1);

        // vider le socket débloque la session, qui constate le débordement et ferme
        assert!(stalled.wait_closed(Duration::from_secs(20)).await.unwrap());

        // le viewer sain reste abonné et reçoit la suite
        running.hub.apply_telemetry(marked("P1", n));
        let message = healthy.next_of_type("telemetry", WAIT).await.unwrap();
        assert_eq!(message["data"]["vitals"]["heart_rate"], n);
        assert_eq!(running.hub.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let config = MonitorConfig {
            host: "127.0.0.1".into(),
            ports: PortsConf { udp: 0, tcp: port, ws: 0 },
            ..Default::default()
        };
        match Monitor::bind(config).await {
            Err(MonitorError::Bind { channel, .. }) => assert_eq!(channel, "alerts (tcp)"),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("bind on a taken port must fail"),
        }
    }
}
