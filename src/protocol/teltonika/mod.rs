pub mod cursor;
pub mod frame;
pub mod io_element;

pub use frame::{create_response, decode_frame, read_imei, Frame, IMEI_ACCEPT, IMEI_REJECT};
pub use io_element::CodecWidth;
