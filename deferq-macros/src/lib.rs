use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod app_event;

/// 为事件载荷实现 `::deferq_core::event::AppEvent`
/// - 默认类型标识为 `模块路径::类型名`
/// - 支持参数：`#[app_event(type_id = "...")]` 指定稳定的类型标识
/// - 不追加派生，`Serialize`/`Deserialize` 需自行声明
#[proc_macro_derive(AppEvent, attributes(app_event))]
pub fn derive_app_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    app_event::expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
