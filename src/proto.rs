pub mod p4runtime {
    pub use rusty_p4_proto::proto::v1::*;
}

pub mod p4config {
    pub use rusty_p4_proto::proto::config::v1::*;
}

pub mod rpc {
    pub use rusty_p4_proto::google::rpc::*;
}
