#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};

use pwrlvl_protocols::{AirodumpApParser, AirodumpClientParser, OutputParser, WashParser};

fn airodump_csv(aps: usize, clients: usize) -> String {
    let mut csv = String::from("\r\nBSSID, First time seen, Last time seen, channel, Speed, Privacy, Cipher, Authentication, Power, # beacons, # IV, LAN IP, ID-length, ESSID, Key\r\n");
    for i in 0..aps {
        csv.push_str(&format!(
            "AA:BB:CC:DD:{:02X}:{:02X}, 2024-01-01 10:00:00, 2024-01-01 10:00:30,  6,  54, WPA2, CCMP, PSK, -42, 120, 3, 0.  0.  0.  0, 8, Net{}, \r\n",
            i / 256,
            i % 256,
            i
        ));
    }
    csv.push_str("\r\nStation MAC, First time seen, Last time seen, Power, # packets, BSSID, Probed ESSIDs\r\n");
    for i in 0..clients {
        csv.push_str(&format!(
            "11:22:33:44:{:02X}:{:02X}, 2024-01-01 10:00:02, 2024-01-01 10:00:28, -55, 12, (not associated), Probe{}\r\n",
            i / 256,
            i % 256,
            i
        ));
    }
    csv
}

fn benchmark_airodump(c: &mut Criterion) {
    let csv = airodump_csv(200, 400);
    let aps = AirodumpApParser::new();
    let clients = AirodumpClientParser::new();

    c.bench_function("airodump_ap_table", |b| b.iter(|| black_box(aps.parse(&csv))));
    c.bench_function("airodump_client_table", |b| b.iter(|| black_box(clients.parse(&csv))));
}

fn benchmark_wash(c: &mut Criterion) {
    let mut out = String::from("BSSID               Ch  dBm  WPS  Lck  Vendor    ESSID\n");
    for i in 0..100 {
        out.push_str(&format!("AA:BB:CC:DD:EE:{:02X}    1  -45  2.0  No   RalinkTe  Net{}\n", i, i));
    }
    let parser = WashParser::new();

    c.bench_function("wash_table", |b| b.iter(|| black_box(parser.parse(&out))));
}

criterion_group!(benches, benchmark_airodump, benchmark_wash);
criterion_main!(benches);
