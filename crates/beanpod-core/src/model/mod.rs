pub mod bean;

pub use bean::{
    Bean, BeanChanges, BeanDraft, BeanFilter, BeanType, ParentChange, ParseEnumError, Priority,
    Status, short_code,
};
