use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    /// Destination log group for the stateful sink. Required: missing
    /// configuration fails `init_from_env` at startup.
    pub log_group: String,

    #[envconfig(default = "pt-fingerprint")]
    pub fingerprint_command: String,
}
