pub mod option;
pub mod packet;

pub use option::{MfCookie, MfOptionError, RewriteStrategy, MF_OPTION_KIND, MF_OPTION_LEN};
pub use packet::{FlowKey, Packet};
