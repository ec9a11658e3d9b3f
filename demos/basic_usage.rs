//! Basic usage example for the codf parser
//!
//! This example parses a small server configuration, walks the resulting
//! document tree, and shows how errors point back into the source.

use codf::{Error, Expr, Node, TokenKind, parse_str};

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Literal(lit) => match lit.kind() {
            TokenKind::Word => lit.token.raw.clone(),
            kind => format!("{} ({kind})", lit.token.raw),
        },
        Expr::Array(ary) => {
            let elems: Vec<_> = ary.iter().map(describe).collect();
            format!("[{}]", elems.join(", "))
        }
        Expr::Map(map) => {
            let entries: Vec<_> = map
                .iter()
                .map(|(key, entry)| format!("{key} => {}", describe(&entry.value)))
                .collect();
            format!("#{{{}}}", entries.join(", "))
        }
    }
}

fn print_node(node: &Node, indent: usize) {
    let args: Vec<_> = node.args().iter().map(describe).collect();
    println!(
        "{:indent$}{} {} (line {})",
        "",
        node.name(),
        args.join(" "),
        node.start().start.line,
    );
    for child in node.children() {
        print_node(child, indent + 2);
    }
}

fn main() -> Result<(), Error> {
    let source = r#"
        ' Front-end server
        server go.spiff.io {
            listen 0.0.0.0:80;
            control unix:///var/run/httpd.sock;
            proxy unix:///var/run/go-redirect.sock {
                strip-x-headers yes;
                log-access no;
            }
            cache memory 64mb {
                expire 10m 404;
                expire 1h  301 302;
                expire 5m  200;
            }
            headers #{ X-Frame-Options DENY X-Retry 3 };
            allow #/^10\./ [127.0.0.1 ::1];
        }
    "#;

    let doc = parse_str("server.conf", source)?;
    println!("Parsed document:");
    for node in &doc.children {
        print_node(node, 2);
    }

    for server in doc.find("server") {
        for expire in server.children().iter().flat_map(Node::children) {
            let ttl = expire.args()[0].as_literal().and_then(|lit| lit.as_duration());
            if let Some(ns) = ttl {
                println!("expire after {}s", ns / 1_000_000_000);
            }
        }
    }

    println!("\nError reporting:");
    for broken in ["server {\n  listen 80;\n", "m #{ 1 2 };", "ratio 1/0;"] {
        match parse_str("broken.conf", broken) {
            Ok(_) => println!("  unexpectedly parsed {broken:?}"),
            Err(err) => println!("  {err}"),
        }
    }

    Ok(())
}
