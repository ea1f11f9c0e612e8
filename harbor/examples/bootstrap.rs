//! Wires a small test-automation stack the way a suite entry point would.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use harbor::prelude::*;

struct Logger {
    prefix: String,
}

impl Logger {
    fn log(&self, msg: &str) {
        println!("[{}] {msg}", self.prefix);
    }
}

struct Browser {
    logger: Arc<Logger>,
    open: AtomicBool,
}

impl Dispose for Browser {
    fn dispose(&self) -> std::result::Result<(), BoxError> {
        self.open.store(false, Ordering::SeqCst);
        self.logger.log("browser closed");
        Ok(())
    }
}

struct AuthClient {
    base_url: Arc<String>,
    logger: Arc<Logger>,
}

struct LoginPage {
    browser: Arc<Browser>,
    auth: Arc<AuthClient>,
}

impl LoginPage {
    fn sign_in(&self, user: &str) {
        self.auth
            .logger
            .log(&format!("signing in {user} against {}", self.auth.base_url));
        assert!(self.browser.open.load(Ordering::SeqCst));
    }
}

struct Infrastructure;

impl Provider for Infrastructure {
    fn register(&self, container: &Container) {
        container
            .register_value("baseUrl", String::from("https://staging.example.com"))
            .register(
                "logger",
                |_| Ok(Logger { prefix: "suite".into() }),
                ServiceOptions::singleton(),
            )
            .register_disposable(
                "browser",
                |deps| {
                    Ok(Browser {
                        logger: deps.get(0)?,
                        open: AtomicBool::new(true),
                    })
                },
                ServiceOptions::singleton().depends_on(["logger"]),
            );
    }
}

struct Pages;

impl Provider for Pages {
    fn register(&self, container: &Container) {
        container
            .register(
                "authClient",
                |deps| {
                    Ok(AuthClient {
                        base_url: deps.by_name("baseUrl")?,
                        logger: deps.by_name("logger")?,
                    })
                },
                ServiceOptions::singleton().depends_on(["baseUrl", "logger"]),
            )
            .register(
                "loginPage",
                |deps| {
                    Ok(LoginPage {
                        browser: deps.get(0)?,
                        auth: deps.get(1)?,
                    })
                },
                ServiceOptions::transient().depends_on(["browser", "authClient"]),
            );
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("harbor_container=debug")
        .init();

    let container = harbor::default_container(&[&Infrastructure, &Pages])?;
    println!("{container:?}");

    let page: Arc<LoginPage> = container.resolve("loginPage")?;
    page.sign_in("qa-bot");

    // A scenario-local override that leaves the suite container untouched.
    let scenario = container.create_child();
    scenario.register_value("baseUrl", String::from("http://localhost:8080"));
    scenario.register(
        "authClient",
        |deps| {
            Ok(AuthClient {
                base_url: deps.get(0)?,
                logger: deps.get(1)?,
            })
        },
        ServiceOptions::singleton().depends_on(["baseUrl", "logger"]),
    );
    let local: Arc<LoginPage> = scenario.resolve("loginPage")?;
    local.sign_in("qa-bot");

    container.dispose();
    Ok(())
}
