//! A small mDNS/DNS-SD smoke-test CLI: register a service, browse a type,
//! or resolve an instance, against a node opened on the default interface.
//! Mirrors `dandyvica-dnsquery`'s `dnsquery` binary in shape (a `clap` 3.0.7
//! builder parsed once in `main`, `log::debug!` for diagnostics) though this
//! exercises a long-lived node rather than a single request/response.
use std::sync::Arc;
use std::time::Duration;

use clap::{App, Arg};
use log::{debug, info};

use mdns_sd_node::{DNSResult, Interface, Node, Properties, ServiceEvent, ServiceInfo, ServiceListener};

struct PrintingListener;

impl ServiceListener for PrintingListener {
    fn event(&self, event: ServiceEvent) {
        match event {
            ServiceEvent::Added(name) => println!("+ {}", name),
            ServiceEvent::Removed(name) => println!("- {}", name),
        }
    }
}

fn main() -> DNSResult<()> {
    env_logger::init();

    let matches = App::new("mdns-probe")
        .version("0.1")
        .about("Register, browse or resolve mDNS/DNS-SD services on the local link")
        .subcommand(
            App::new("register")
                .about("Registers one service instance and keeps it advertised until interrupted")
                .arg(Arg::new("type").short('t').long("type").required(true).takes_value(true))
                .arg(Arg::new("name").short('n').long("name").required(true).takes_value(true))
                .arg(Arg::new("port").short('p').long("port").required(true).takes_value(true))
                .arg(Arg::new("prop").long("prop").takes_value(true).multiple_occurrences(true).help("key=value, repeatable")),
        )
        .subcommand(
            App::new("browse")
                .about("Browses a service type and prints add/remove events")
                .arg(Arg::new("type").short('t').long("type").required(true).takes_value(true))
                .arg(Arg::new("seconds").short('s').long("seconds").takes_value(true).default_value("10")),
        )
        .subcommand(
            App::new("resolve")
                .about("Resolves one known instance name to its address, port and text records")
                .arg(Arg::new("type").short('t').long("type").required(true).takes_value(true))
                .arg(Arg::new("name").short('n').long("name").required(true).takes_value(true))
                .arg(Arg::new("timeout-ms").long("timeout-ms").takes_value(true).default_value("3000")),
        )
        .get_matches();

    debug!("parsed arguments: {:?}", &matches);

    let mut node = Node::open(&Interface::Default)?;

    match matches.subcommand() {
        Some(("register", sub)) => {
            let service_type = sub.value_of("type").unwrap();
            let name = sub.value_of("name").unwrap();
            let port: u16 = sub.value_of("port").unwrap().parse().expect("port must be a u16");

            let mut properties = Properties::new();
            if let Some(props) = sub.values_of("prop") {
                for prop in props {
                    if let Some((key, value)) = prop.split_once('=') {
                        properties.set(key, value);
                    }
                }
            }

            let instance_name = format!("{}.{}", name, service_type);
            let info = ServiceInfo::new(service_type, &instance_name, None, port, 0, 0, None, properties)?;
            let registered = node.register_service(info, 120)?;
            info!("registered {}", registered.instance_name);
            println!("registered as {}", registered.instance_name);

            std::thread::sleep(Duration::from_secs(3600));
        }
        Some(("browse", sub)) => {
            let service_type = sub.value_of("type").unwrap();
            let seconds: u64 = sub.value_of("seconds").unwrap().parse().expect("seconds must be a u64");

            let browser = node.add_service_listener(service_type, Arc::new(PrintingListener));
            std::thread::sleep(Duration::from_secs(seconds));
            node.remove_service_listener(&browser);
        }
        Some(("resolve", sub)) => {
            let service_type = sub.value_of("type").unwrap();
            let name = sub.value_of("name").unwrap();
            let timeout_ms: u64 = sub.value_of("timeout-ms").unwrap().parse().expect("timeout-ms must be a u64");

            match node.get_service_info(service_type, name, timeout_ms) {
                Some(info) => println!("{:#?}", info),
                None => println!("no answer within {}ms", timeout_ms),
            }
        }
        _ => {
            eprintln!("one of register/browse/resolve is required, see --help");
        }
    }

    node.close()?;
    Ok(())
}
